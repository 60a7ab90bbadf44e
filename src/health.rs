//! Run counters behind the `/health` endpoint and the chat summaries.

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
struct Counters {
    checks: u64,
    check_failures: u64,
    notifications: u64,
    last_check: Option<DateTime<Utc>>,
}

pub struct HealthStats {
    started_at: Instant,
    inner: Mutex<Counters>,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub uptime: String,
    pub last_check: Option<String>,
    pub failure_rate: String,
    pub checks: u64,
    pub notifications: u64,
}

impl HealthStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            inner: Mutex::new(Counters::default()),
        }
    }

    /// One account check finished; `failed` when every source came back
    /// empty for it.
    pub fn record_check(&self, failed: bool) {
        let mut inner = self.inner.lock().expect("health mutex poisoned");
        inner.checks += 1;
        if failed {
            inner.check_failures += 1;
        }
        inner.last_check = Some(Utc::now());
    }

    pub fn record_notification(&self) {
        let mut inner = self.inner.lock().expect("health mutex poisoned");
        inner.notifications += 1;
    }

    pub fn report(&self) -> HealthReport {
        let inner = self.inner.lock().expect("health mutex poisoned");
        let secs = self.started_at.elapsed().as_secs();
        HealthReport {
            uptime: format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
            last_check: inner.last_check.map(|t| t.to_rfc3339()),
            failure_rate: failure_rate(inner.checks, inner.check_failures),
            checks: inner.checks,
            notifications: inner.notifications,
        }
    }
}

impl Default for HealthStats {
    fn default() -> Self {
        Self::new()
    }
}

fn failure_rate(checks: u64, failures: u64) -> String {
    if checks == 0 {
        return "0%".to_string();
    }
    let pct = (failures as f64 / checks as f64) * 100.0;
    format!("{}%", pct.round() as u64)
}
