// src/scheduler.rs
//! # Check Loop
//!
//! One cycle checks every tracked account in `MAX_CONCURRENT`-sized
//! batches. Accounts inside a batch run concurrently and the batch
//! always settles as a whole before the next one starts, so a slow
//! mirror can delay a cycle but never interleave it. Between cycles the
//! loop sleeps an adaptive, jittered interval that shortens while the
//! tracked accounts are busy and drifts back toward the maximum when
//! they go quiet.

use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use rand::Rng;

use crate::cache::CacheStats;
use crate::context::AppContext;

/// Delay between two notifications for the same account, so a burst of
/// posts does not hit the chat rate limit.
pub const PACING_MS: u64 = 2000;
/// How much one activity point shortens the base interval.
pub const ACTIVITY_STEP_MS: u64 = 60_000;
pub const JITTER_MAX_MS: u64 = 30_000;

#[derive(Debug, Default, Clone)]
pub struct CycleSummary {
    pub accounts_checked: usize,
    pub new_posts: usize,
    pub bootstrapped: usize,
    pub failures: usize,
}

#[derive(Debug, Default)]
struct AccountOutcome {
    new_posts: usize,
    bootstrapped: bool,
    failed: bool,
}

/// Runs one full check cycle. `manual` cycles additionally report a
/// summary back to the operator chat.
pub async fn run_check_cycle(ctx: &AppContext, manual: bool) -> CycleSummary {
    let tracked = { ctx.state.lock().await.accounts_snapshot() };
    let mut summary = CycleSummary {
        accounts_checked: tracked.len(),
        ..Default::default()
    };

    if tracked.is_empty() {
        tracing::debug!("no accounts tracked, nothing to check");
    } else {
        let width = ctx.config.max_concurrent.max(1);
        for batch in tracked.chunks(width) {
            let outcomes = join_all(batch.iter().map(|a| check_account(ctx, a))).await;
            for outcome in outcomes {
                summary.new_posts += outcome.new_posts;
                if outcome.bootstrapped {
                    summary.bootstrapped += 1;
                }
                if outcome.failed {
                    summary.failures += 1;
                }
            }
        }
        if summary.new_posts > 0 || summary.bootstrapped > 0 {
            persist_state(ctx).await;
        }
    }

    if manual {
        let text = summary_text(&summary, &ctx.cache.stats());
        if let Err(e) = ctx
            .telegram
            .send_message(ctx.config.chat_id, &text, None)
            .await
        {
            tracing::warn!(error = %e, "could not deliver manual check summary");
        }
    }
    summary
}

/// One immediate fetch-and-index pass for a freshly added account, so
/// its backlog is indexed silently before the next scheduled cycle.
pub async fn bootstrap_account(ctx: &AppContext, account: &str) {
    // The account may have been removed again while this task waited
    // its turn.
    let tracked = { ctx.state.lock().await.is_tracked(account) };
    if !tracked {
        return;
    }
    let outcome = check_account(ctx, account).await;
    if outcome.bootstrapped || outcome.new_posts > 0 {
        persist_state(ctx).await;
    }
}

async fn check_account(ctx: &AppContext, account: &str) -> AccountOutcome {
    counter!("relay_checks_total").increment(1);

    let Some(fetched) = ctx.fetcher.fetch_tweets(account).await else {
        ctx.health.record_check(true);
        return AccountOutcome {
            failed: true,
            ..Default::default()
        };
    };
    ctx.health.record_check(false);

    let source = fetched.source;
    let mut tweets = fetched.tweets;
    // Chronological, oldest first; the sort is stable so items sharing a
    // timestamp keep their feed order.
    tweets.sort_by_key(|t| t.created_at);

    {
        let mut state = ctx.state.lock().await;
        if !state.is_bootstrapped(account) {
            for tweet in &tweets {
                state.record_seen(&tweet.id);
            }
            state.mark_bootstrapped(account);
            tracing::info!(account, indexed = tweets.len(), "first pass indexed silently");
            return AccountOutcome {
                bootstrapped: true,
                ..Default::default()
            };
        }
    }

    let mut outcome = AccountOutcome::default();
    for tweet in &tweets {
        let already_seen = { ctx.state.lock().await.is_seen(&tweet.id) };
        if already_seen {
            continue;
        }
        // Pacing goes between consecutive sends; the account's last send
        // carries no trailing delay.
        if outcome.new_posts > 0 {
            tokio::time::sleep(Duration::from_millis(PACING_MS)).await;
        }
        // The id is recorded only after a successful send; a failed send
        // leaves it unseen so the next cycle retries it.
        match ctx.notifier.notify_tweet(account, &source, tweet).await {
            Ok(()) => {
                {
                    let mut state = ctx.state.lock().await;
                    state.record_seen(&tweet.id);
                    state.bump_activity();
                }
                ctx.health.record_notification();
                counter!("relay_notifications_total").increment(1);
                outcome.new_posts += 1;
            }
            Err(e) => {
                tracing::warn!(account, id = %tweet.id, error = %e, "notification failed, retrying next cycle");
            }
        }
    }
    outcome
}

async fn persist_state(ctx: &AppContext) {
    let (seen, bootstrap) = {
        let state = ctx.state.lock().await;
        (state.seen_snapshot(), state.bootstrap_snapshot())
    };
    if let Err(e) = ctx.storage.save_seen_ids(&seen) {
        tracing::warn!(error = %e, "persisting seen ids failed");
    }
    if let Err(e) = ctx.storage.save_bootstrap(&bootstrap) {
        tracing::warn!(error = %e, "persisting bootstrap map failed");
    }
}

/// The endless polling loop. Runs until the task is dropped.
pub async fn run(ctx: AppContext) {
    loop {
        let summary = run_check_cycle(&ctx, false).await;

        let (activity, delay) = {
            let mut state = ctx.state.lock().await;
            state.decay_activity();
            let activity = state.activity();
            let delay = compute_delay(
                ctx.config.check_interval_min,
                ctx.config.check_interval_max,
                activity,
                jitter(),
            );
            (activity, delay)
        };

        tracing::info!(
            accounts = summary.accounts_checked,
            new_posts = summary.new_posts,
            failures = summary.failures,
            activity,
            next_check_secs = delay.as_secs(),
            "check cycle complete"
        );
        tokio::time::sleep(delay).await;
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..=JITTER_MAX_MS))
}

/// Next-cycle delay: the maximum interval pulled down one
/// `ACTIVITY_STEP_MS` per activity point, never below the minimum, plus
/// the caller-supplied jitter.
fn compute_delay(min: Duration, max: Duration, activity: u32, jitter: Duration) -> Duration {
    let span = max.saturating_sub(min);
    let pull = Duration::from_millis(u64::from(activity).saturating_mul(ACTIVITY_STEP_MS)).min(span);
    (max - pull) + jitter
}

fn summary_text(summary: &CycleSummary, cache: &CacheStats) -> String {
    format!(
        "✅ Check finished\nAccounts checked: {} ({} failed)\nNew posts: {}\nCache: {} hits / {} misses, {} entries",
        summary.accounts_checked,
        summary.failures,
        summary.new_posts,
        cache.hits,
        cache.misses,
        cache.size,
    )
}
