//! # Fetch Orchestrator
//!
//! Walks the configured sources in priority order until one of them
//! yields a usable result, retrying the whole chain with exponential
//! backoff when every source comes back empty-handed.

use std::time::Duration;

use metrics::counter;

use crate::sources::{FetchResult, FetchSource};

const BASE_BACKOFF_MS: u64 = 500;
// 500ms << 4 = 8s; further attempts stay at the cap.
const MAX_BACKOFF_SHIFT: u32 = 4;

pub struct FetchOrchestrator {
    sources: Vec<Box<dyn FetchSource>>,
    max_retries: u32,
    base_backoff: Duration,
}

impl FetchOrchestrator {
    pub fn new(sources: Vec<Box<dyn FetchSource>>, max_retries: u32) -> Self {
        Self {
            sources,
            max_retries,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        }
    }

    /// Shrinks the backoff base so tests do not sleep for real.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// One attempt walks every source in order; an attempt succeeds as
    /// soon as any source returns a result. `max_retries` extra attempts
    /// follow the first, so the chain runs at most `max_retries + 1` times.
    pub async fn fetch_tweets(&self, account: &str) -> Option<FetchResult> {
        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            for source in &self.sources {
                if let Some(result) = source.fetch(account).await {
                    tracing::debug!(
                        account,
                        source = source.name(),
                        items = result.tweets.len(),
                        attempt,
                        "fetch succeeded"
                    );
                    return Some(result);
                }
            }
            if attempt < attempts {
                let backoff = self.base_backoff * (1u32 << (attempt - 1).min(MAX_BACKOFF_SHIFT));
                tracing::debug!(account, attempt, backoff_ms = backoff.as_millis() as u64, "all sources failed, backing off");
                tokio::time::sleep(backoff).await;
            }
        }
        tracing::warn!(account, attempts, "all sources exhausted");
        counter!("relay_fetch_failures_total").increment(1);
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::sources::Tweet;

    struct ScriptedSource {
        calls: Arc<AtomicU32>,
        succeed_on_call: Option<u32>,
    }

    #[async_trait]
    impl FetchSource for ScriptedSource {
        async fn fetch(&self, _account: &str) -> Option<FetchResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.succeed_on_call {
                Some(FetchResult {
                    source: "scripted".to_string(),
                    tweets: vec![Tweet {
                        id: "1".to_string(),
                        text: "ok".to_string(),
                        created_at: Default::default(),
                        media: vec![],
                    }],
                })
            } else {
                None
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn orchestrator(calls: Arc<AtomicU32>, succeed_on_call: Option<u32>, retries: u32) -> FetchOrchestrator {
        FetchOrchestrator::new(
            vec![Box::new(ScriptedSource {
                calls,
                succeed_on_call,
            })],
            retries,
        )
        .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn stops_after_max_retries_plus_one_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = orchestrator(calls.clone(), None, 3);
        assert!(orch.fetch_tweets("alice").await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn returns_early_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = orchestrator(calls.clone(), Some(2), 3);
        let result = orch.fetch_tweets("alice").await.expect("second attempt succeeds");
        assert_eq!(result.tweets.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = orchestrator(calls.clone(), None, 0);
        assert!(orch.fetch_tweets("alice").await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
