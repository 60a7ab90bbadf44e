// src/config.rs
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Built-in Nitter mirror rotation. Mirrors come and go; operators can
/// override the list at runtime via `NITTER_MIRRORS` without a rebuild.
pub const DEFAULT_NITTER_MIRRORS: &[&str] = &[
    "https://nitter.net",
    "https://nitter.poast.org",
    "https://nitter.privacydev.net",
    "https://xcancel.com",
    "https://lightbrd.com",
];

/// Runtime configuration resolved from the environment (after `.env` load).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Telegram bot credential. Required; startup aborts without it.
    pub bot_token: String,
    /// Operator chat that receives notifications and issues commands.
    pub chat_id: i64,
    pub cache_ttl: Duration,
    pub check_interval_min: Duration,
    pub check_interval_max: Duration,
    /// Width of one concurrent fetch batch in the check cycle.
    pub max_concurrent: usize,
    /// Extra orchestrator attempts after the first one.
    pub max_retries: u32,
    pub port: u16,
    pub state_dir: PathBuf,
    /// Seed list used only when no persisted account list exists yet.
    pub seed_accounts: Vec<String>,
    pub nitter_mirrors: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN missing; the bot cannot run without a credential")?;
        let chat_id: i64 = env::var("TELEGRAM_CHAT_ID")
            .context("TELEGRAM_CHAT_ID missing; there is no destination to notify")?
            .trim()
            .parse()
            .context("TELEGRAM_CHAT_ID is not a valid chat id")?;

        let mut check_interval_min = env_ms("CHECK_INTERVAL_MIN", 300_000);
        let mut check_interval_max = env_ms("CHECK_INTERVAL_MAX", 900_000);
        if check_interval_min > check_interval_max {
            // keep a valid interval
            std::mem::swap(&mut check_interval_min, &mut check_interval_max);
        }

        Ok(Self {
            bot_token,
            chat_id,
            cache_ttl: env_ms("CACHE_TTL", 600_000),
            check_interval_min,
            check_interval_max,
            max_concurrent: env_num("MAX_CONCURRENT", 3).max(1),
            max_retries: env_num("MAX_RETRIES", 3),
            port: env_num("PORT", 3000),
            state_dir: PathBuf::from(
                env::var("STATE_DIR").unwrap_or_else(|_| "state".to_string()),
            ),
            seed_accounts: split_list(&env::var("TRACKED_ACCOUNTS").unwrap_or_default()),
            nitter_mirrors: mirrors_from_env(),
        })
    }
}

fn env_ms(key: &str, default_ms: u64) -> Duration {
    let ms: u64 = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_num<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated env value, trimming entries and dropping empties.
/// Order is preserved; duplicates are dropped on first-wins basis.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let t = part.trim();
        if !t.is_empty() && !out.iter().any(|p| p == t) {
            out.push(t.to_string());
        }
    }
    out
}

fn mirrors_from_env() -> Vec<String> {
    let from_env = env::var("NITTER_MIRRORS").unwrap_or_default();
    let list = split_list(&from_env);
    if list.is_empty() {
        DEFAULT_NITTER_MIRRORS
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        list
    }
}
