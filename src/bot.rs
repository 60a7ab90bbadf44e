// src/bot.rs
//! # Chat Control Surface
//!
//! Long-polls the Bot API for operator input: menu buttons, `/start`,
//! `/help`, `/stats`, and the inline-keyboard removal flow. Everything
//! outside the configured operator chat is ignored. The loop is a
//! single task, so the add-account prompt state lives in a plain local
//! without any locking.

use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::notify::telegram::{CallbackQuery, Update};
use crate::scheduler;
use crate::state::is_valid_handle;

const POLL_SECS: u64 = 30;

// Menu labels double as match keys for inbound text.
const BTN_CHECK: &str = "🔄 Check now";
const BTN_LIST: &str = "📋 Tracked accounts";
const BTN_ADD: &str = "➕ Add account";
const BTN_REMOVE: &str = "➖ Remove account";
const BTN_HEALTH: &str = "📊 Health";
const BTN_STATS: &str = "📈 Stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    AwaitAccountName,
}

/// The endless update loop. Runs until the task is dropped.
pub async fn run(ctx: AppContext) {
    let mut offset: i64 = 0;
    let mut pending: Option<PendingAction> = None;
    tracing::info!("bot update loop started");
    loop {
        let updates = match ctx.telegram.get_updates(offset, POLL_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed, retrying shortly");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Err(e) = handle_update(&ctx, update, &mut pending).await {
                tracing::warn!(error = %e, "update handling failed");
            }
        }
    }
}

async fn handle_update(
    ctx: &AppContext,
    update: Update,
    pending: &mut Option<PendingAction>,
) -> Result<()> {
    if let Some(message) = update.message {
        if message.chat.id != ctx.config.chat_id {
            tracing::debug!(chat = message.chat.id, "ignoring message from foreign chat");
            return Ok(());
        }
        if let Some(text) = message.text {
            return handle_command(ctx, text.trim(), pending).await;
        }
        return Ok(());
    }
    if let Some(cb) = update.callback_query {
        return handle_callback(ctx, cb).await;
    }
    Ok(())
}

async fn handle_command(
    ctx: &AppContext,
    text: &str,
    pending: &mut Option<PendingAction>,
) -> Result<()> {
    let chat_id = ctx.config.chat_id;

    // Any known command cancels an open prompt; everything else while a
    // prompt is open is treated as the prompt's answer.
    if is_known_command(text) {
        *pending = None;
    } else if pending.take() == Some(PendingAction::AwaitAccountName) {
        return add_account(ctx, text).await;
    }

    match text {
        "/start" | "/help" => {
            ctx.telegram
                .send_message(chat_id, &help_text(), Some(menu_keyboard()))
                .await
        }
        "/stats" | BTN_STATS => {
            let text = stats_text(ctx).await;
            ctx.telegram.send_message(chat_id, &text, None).await
        }
        BTN_CHECK => {
            ctx.telegram
                .send_message(chat_id, "⏳ Checking all tracked accounts…", None)
                .await?;
            let ctx = ctx.clone();
            tokio::spawn(async move {
                scheduler::run_check_cycle(&ctx, true).await;
            });
            Ok(())
        }
        BTN_LIST => {
            let text = list_text(ctx).await;
            ctx.telegram.send_message(chat_id, &text, None).await
        }
        BTN_ADD => {
            *pending = Some(PendingAction::AwaitAccountName);
            ctx.telegram
                .send_message(chat_id, "Send the account name to track (without @):", None)
                .await
        }
        BTN_REMOVE => send_remove_keyboard(ctx).await,
        BTN_HEALTH => {
            let text = health_text(ctx).await;
            ctx.telegram.send_message(chat_id, &text, None).await
        }
        _ => {
            ctx.telegram
                .send_message(chat_id, "Unknown command. /help shows the menu.", None)
                .await
        }
    }
}

fn is_known_command(text: &str) -> bool {
    matches!(
        text,
        "/start" | "/help" | "/stats" | BTN_CHECK | BTN_LIST | BTN_ADD | BTN_REMOVE | BTN_HEALTH
            | BTN_STATS
    )
}

async fn add_account(ctx: &AppContext, raw: &str) -> Result<()> {
    let chat_id = ctx.config.chat_id;
    let handle = raw.trim().trim_start_matches('@').to_lowercase();
    if !is_valid_handle(&handle) {
        return ctx
            .telegram
            .send_message(
                chat_id,
                &format!("✗ \"{raw}\" is not a valid username (1-15 letters, digits or _)."),
                None,
            )
            .await;
    }

    let added = { ctx.state.lock().await.add_account(&handle) };
    if !added {
        return ctx
            .telegram
            .send_message(chat_id, &format!("@{handle} is already tracked."), None)
            .await;
    }
    persist_accounts(ctx).await;

    // Index the current timeline silently so only future posts notify.
    let spawn_ctx = ctx.clone();
    let spawn_handle = handle.clone();
    tokio::spawn(async move {
        scheduler::bootstrap_account(&spawn_ctx, &spawn_handle).await;
    });

    ctx.telegram
        .send_message(
            chat_id,
            &format!("✓ Now tracking @{handle}. Indexing the current timeline silently."),
            None,
        )
        .await
}

async fn send_remove_keyboard(ctx: &AppContext) -> Result<()> {
    let accounts = { ctx.state.lock().await.accounts_snapshot() };
    if accounts.is_empty() {
        return ctx
            .telegram
            .send_message(ctx.config.chat_id, "No accounts tracked.", None)
            .await;
    }
    ctx.telegram
        .send_message(
            ctx.config.chat_id,
            "Select the account to remove:",
            Some(remove_keyboard(&accounts)),
        )
        .await
}

async fn handle_callback(ctx: &AppContext, cb: CallbackQuery) -> Result<()> {
    // Answer first so the client stops its spinner even if we bail out.
    if let Err(e) = ctx.telegram.answer_callback(&cb.id).await {
        tracing::debug!(error = %e, "answerCallbackQuery failed");
    }

    let chat_ok = cb
        .message
        .as_ref()
        .map(|m| m.chat.id == ctx.config.chat_id)
        .unwrap_or(false);
    if !chat_ok {
        return Ok(());
    }
    let Some(data) = cb.data.as_deref() else {
        return Ok(());
    };
    let chat_id = ctx.config.chat_id;
    let message_id = cb.message.as_ref().map(|m| m.message_id);

    if let Some(handle) = data.strip_prefix("rm:") {
        return ctx
            .telegram
            .send_message(
                chat_id,
                &format!("Remove @{handle} from tracking?"),
                Some(confirm_keyboard(handle)),
            )
            .await;
    }

    if let Some(handle) = data.strip_prefix("rmok:") {
        let removed = { ctx.state.lock().await.remove_account(handle) };
        if removed {
            let (accounts, bootstrap) = {
                let state = ctx.state.lock().await;
                (state.accounts_snapshot(), state.bootstrap_snapshot())
            };
            if let Err(e) = ctx.storage.save_accounts(&accounts) {
                tracing::warn!(error = %e, "persisting account list failed");
            }
            if let Err(e) = ctx.storage.save_bootstrap(&bootstrap) {
                tracing::warn!(error = %e, "persisting bootstrap map failed");
            }
        }
        retire_keyboard(ctx, message_id).await;
        let text = if removed {
            format!("✓ Stopped tracking @{handle}.")
        } else {
            format!("@{handle} was not tracked.")
        };
        return ctx.telegram.send_message(chat_id, &text, None).await;
    }

    if data == "rmno" {
        retire_keyboard(ctx, message_id).await;
        return ctx
            .telegram
            .send_message(chat_id, "Removal cancelled.", None)
            .await;
    }

    tracing::debug!(data, "unrecognized callback data");
    Ok(())
}

/// Strips the inline keyboard off an answered confirmation prompt.
async fn retire_keyboard(ctx: &AppContext, message_id: Option<i64>) {
    if let Some(message_id) = message_id {
        if let Err(e) = ctx
            .telegram
            .edit_message_reply_markup(ctx.config.chat_id, message_id, None)
            .await
        {
            tracing::debug!(error = %e, "clearing inline keyboard failed");
        }
    }
}

async fn persist_accounts(ctx: &AppContext) {
    let accounts = { ctx.state.lock().await.accounts_snapshot() };
    if let Err(e) = ctx.storage.save_accounts(&accounts) {
        tracing::warn!(error = %e, "persisting account list failed");
    }
}

// ----------------------------------------------------------------------
// message builders
// ----------------------------------------------------------------------

fn help_text() -> String {
    [
        "Tweet relay bot",
        "",
        "Relays new posts from tracked accounts into this chat.",
        "",
        "/help - this banner and the menu",
        "/stats - run statistics",
        "The menu buttons cover checking, listing, adding and removing accounts.",
    ]
    .join("\n")
}

fn menu_keyboard() -> Value {
    json!({
        "keyboard": [
            [{ "text": BTN_CHECK }, { "text": BTN_LIST }],
            [{ "text": BTN_ADD }, { "text": BTN_REMOVE }],
            [{ "text": BTN_HEALTH }, { "text": BTN_STATS }],
        ],
        "resize_keyboard": true,
    })
}

fn remove_keyboard(accounts: &[String]) -> Value {
    let rows: Vec<Value> = accounts
        .iter()
        .map(|a| json!([{ "text": format!("@{a}"), "callback_data": format!("rm:{a}") }]))
        .collect();
    json!({ "inline_keyboard": rows })
}

fn confirm_keyboard(handle: &str) -> Value {
    json!({
        "inline_keyboard": [[
            { "text": "Yes, remove", "callback_data": format!("rmok:{handle}") },
            { "text": "Cancel", "callback_data": "rmno" },
        ]]
    })
}

async fn list_text(ctx: &AppContext) -> String {
    let accounts = { ctx.state.lock().await.accounts_snapshot() };
    if accounts.is_empty() {
        return "No accounts tracked yet. Use ➕ Add account.".to_string();
    }
    let mut out = format!("Tracking {} account(s):\n", accounts.len());
    for account in &accounts {
        out.push_str(&format!("• @{account}\n"));
    }
    out
}

async fn health_text(ctx: &AppContext) -> String {
    let report = ctx.health.report();
    let cache = ctx.cache.stats();
    let (users, seen) = {
        let state = ctx.state.lock().await;
        (state.tracked_count(), state.seen_count())
    };
    format!(
        "📊 Health\nStatus: ok (polling)\nUptime: {}\nAccounts: {}\nTweets tracked: {}\nLast check: {}\nFailure rate: {}\nCache: {} hits / {} misses, {} entries",
        report.uptime,
        users,
        seen,
        report.last_check.unwrap_or_else(|| "never".to_string()),
        report.failure_rate,
        cache.hits,
        cache.misses,
        cache.size,
    )
}

async fn stats_text(ctx: &AppContext) -> String {
    let report = ctx.health.report();
    let (users, seen, activity) = {
        let state = ctx.state.lock().await;
        (state.tracked_count(), state.seen_count(), state.activity())
    };
    format!(
        "📈 Stats\nChecks run: {}\nNotifications sent: {}\nAccounts tracked: {}\nIds remembered: {}\nActivity level: {}",
        report.checks, report.notifications, users, seen, activity,
    )
}
