// tests/scheduler_scenarios.rs
//! Check-cycle behavior end to end with scripted sources:
//! - first fetch for an account indexes silently (no notifications)
//! - later fetches notify only unseen posts, oldest first
//! - pacing sits between consecutive sends, with no trailing delay
//! - an account whose sources all fail is terminal for the cycle, not fatal
//! - a failed send leaves the id unrecorded so the next cycle retries it

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use tempfile::tempdir;
use tokio::sync::Mutex as AsyncMutex;

use tweet_relay_bot::cache::ResponseCache;
use tweet_relay_bot::config::AppConfig;
use tweet_relay_bot::context::AppContext;
use tweet_relay_bot::fetcher::FetchOrchestrator;
use tweet_relay_bot::health::HealthStats;
use tweet_relay_bot::notify::telegram::TelegramClient;
use tweet_relay_bot::notify::Notifier;
use tweet_relay_bot::scheduler;
use tweet_relay_bot::sources::{FetchResult, FetchSource, Tweet};
use tweet_relay_bot::state::MonitorState;
use tweet_relay_bot::storage::Storage;

fn tweet(id: &str, secs: i64) -> Tweet {
    Tweet {
        id: id.to_string(),
        text: format!("post {id}"),
        created_at: DateTime::from_timestamp(secs, 0).expect("valid timestamp"),
        media: vec![],
    }
}

struct StaticSource {
    tweets: Vec<Tweet>,
}

#[async_trait]
impl FetchSource for StaticSource {
    async fn fetch(&self, _account: &str) -> Option<FetchResult> {
        Some(FetchResult {
            source: "Scripted".to_string(),
            tweets: self.tweets.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

struct FailingSource;

#[async_trait]
impl FetchSource for FailingSource {
    async fn fetch(&self, _account: &str) -> Option<FetchResult> {
        None
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_tweet(&self, account: &str, _source: &str, tweet: &Tweet) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated send failure");
        }
        self.sent
            .lock()
            .unwrap()
            .push(format!("{account}:{}", tweet.id));
        Ok(())
    }
}

fn build_context(
    dir: &Path,
    sources: Vec<Box<dyn FetchSource>>,
    notifier: Arc<RecordingNotifier>,
    state: MonitorState,
) -> AppContext {
    let config = AppConfig {
        bot_token: "123:test".to_string(),
        chat_id: 1,
        cache_ttl: Duration::from_millis(600_000),
        check_interval_min: Duration::from_millis(300_000),
        check_interval_max: Duration::from_millis(900_000),
        max_concurrent: 3,
        max_retries: 0,
        port: 0,
        state_dir: dir.to_path_buf(),
        seed_accounts: vec![],
        nitter_mirrors: vec![],
    };
    let fetcher =
        FetchOrchestrator::new(sources, config.max_retries).with_backoff(Duration::from_millis(1));
    AppContext {
        config: Arc::new(config),
        cache: Arc::new(ResponseCache::new(Duration::from_millis(600_000))),
        state: Arc::new(AsyncMutex::new(state)),
        storage: Arc::new(Storage::new(dir)),
        fetcher: Arc::new(fetcher),
        telegram: TelegramClient::new("123:test".to_string(), reqwest::Client::new()),
        notifier,
        health: Arc::new(HealthStats::new()),
    }
}

#[tokio::test(start_paused = true)]
async fn first_fetch_indexes_silently() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut state = MonitorState::new();
    state.add_account("alice");

    let sources: Vec<Box<dyn FetchSource>> = vec![Box::new(StaticSource {
        tweets: vec![tweet("1", 100), tweet("2", 200), tweet("3", 300)],
    })];
    let ctx = build_context(dir.path(), sources, notifier.clone(), state);

    let summary = scheduler::run_check_cycle(&ctx, false).await;

    assert_eq!(summary.accounts_checked, 1);
    assert_eq!(summary.bootstrapped, 1);
    assert_eq!(summary.new_posts, 0);
    assert!(notifier.sent().is_empty(), "bootstrap must not notify");

    {
        let st = ctx.state.lock().await;
        assert!(st.is_bootstrapped("alice"));
        for id in ["1", "2", "3"] {
            assert!(st.is_seen(id), "id {id} should be indexed");
        }
    }

    // the bootstrap change was persisted
    let stored = Storage::new(dir.path());
    assert_eq!(stored.load_seen_ids().len(), 3);
    assert_eq!(stored.load_bootstrap().get("alice"), Some(&true));
}

#[tokio::test(start_paused = true)]
async fn only_unseen_posts_notify_oldest_first() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut state = MonitorState::new();
    state.add_account("bob");
    state.mark_bootstrapped("bob");
    state.record_seen("10");
    state.record_seen("11");

    // deliberately unsorted feed order; 12 and 13 are new
    let sources: Vec<Box<dyn FetchSource>> = vec![Box::new(StaticSource {
        tweets: vec![
            tweet("13", 400),
            tweet("10", 100),
            tweet("12", 300),
            tweet("11", 200),
        ],
    })];
    let ctx = build_context(dir.path(), sources, notifier.clone(), state);

    let summary = scheduler::run_check_cycle(&ctx, false).await;

    assert_eq!(summary.new_posts, 2);
    assert_eq!(
        notifier.sent(),
        vec!["bob:12".to_string(), "bob:13".to_string()],
        "new posts must go out oldest first"
    );

    let st = ctx.state.lock().await;
    assert!(st.is_seen("12"));
    assert!(st.is_seen("13"));
    assert_eq!(st.activity(), 2);
}

#[tokio::test(start_paused = true)]
async fn pacing_separates_sends_without_a_trailing_delay() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut state = MonitorState::new();
    state.add_account("erin");
    state.mark_bootstrapped("erin");

    let sources: Vec<Box<dyn FetchSource>> = vec![Box::new(StaticSource {
        tweets: vec![tweet("21", 100), tweet("22", 200), tweet("23", 300)],
    })];
    let ctx = build_context(dir.path(), sources, notifier.clone(), state);

    let started = tokio::time::Instant::now();
    let summary = scheduler::run_check_cycle(&ctx, false).await;
    let elapsed = started.elapsed();

    assert_eq!(summary.new_posts, 3);
    assert_eq!(
        notifier.sent(),
        vec![
            "erin:21".to_string(),
            "erin:22".to_string(),
            "erin:23".to_string()
        ]
    );
    // Three sends take two pacing gaps. The paused clock only advances
    // inside `sleep`, so the cycle's virtual elapsed time is exactly the
    // gaps and a trailing delay would show up as a third.
    assert_eq!(
        elapsed,
        Duration::from_millis(2 * scheduler::PACING_MS),
        "expected exactly two pacing gaps for three sends"
    );
}

#[tokio::test]
async fn total_source_failure_is_terminal_but_not_fatal() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut state = MonitorState::new();
    state.add_account("carol");
    state.mark_bootstrapped("carol");

    let sources: Vec<Box<dyn FetchSource>> =
        vec![Box::new(FailingSource), Box::new(FailingSource)];
    let ctx = build_context(dir.path(), sources, notifier.clone(), state);

    let summary = scheduler::run_check_cycle(&ctx, false).await;

    assert_eq!(summary.failures, 1);
    assert_eq!(summary.new_posts, 0);
    assert!(notifier.sent().is_empty());
    assert_eq!(ctx.health.report().failure_rate, "100%");

    // nothing changed, nothing persisted
    assert!(Storage::new(dir.path()).load_seen_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_send_is_retried_on_the_next_cycle() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut state = MonitorState::new();
    state.add_account("dave");
    state.mark_bootstrapped("dave");

    let sources: Vec<Box<dyn FetchSource>> = vec![Box::new(StaticSource {
        tweets: vec![tweet("7", 100)],
    })];
    let ctx = build_context(dir.path(), sources, notifier.clone(), state);

    notifier.fail.store(true, Ordering::SeqCst);
    let summary = scheduler::run_check_cycle(&ctx, false).await;
    assert_eq!(summary.new_posts, 0);
    assert!(notifier.sent().is_empty());
    assert!(
        !ctx.state.lock().await.is_seen("7"),
        "failed send must leave the id unrecorded"
    );

    notifier.fail.store(false, Ordering::SeqCst);
    let summary = scheduler::run_check_cycle(&ctx, false).await;
    assert_eq!(summary.new_posts, 1);
    assert_eq!(notifier.sent(), vec!["dave:7".to_string()]);
    assert!(ctx.state.lock().await.is_seen("7"));
}
