//! # Telegram Transport
//!
//! Thin client over the Bot API: outbound messages and photos for the
//! relay itself, long-polled updates and callback answers for the
//! control surface. Every call goes through the same `ApiResponse`
//! envelope check so a `200 OK` with `"ok": false` still surfaces as an
//! error.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{format_caption, Notifier};
use crate::sources::Tweet;

const API_BASE: &str = "https://api.telegram.org";

// No `serde(default)` on `result`: the derive would then demand
// `T: Default`, which `call`'s `T: DeserializeOwned` callers cannot
// supply. Missing `Option` fields already decode to `None`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    base: String,
    client: Client,
    timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: String, client: Client) -> Self {
        Self {
            token,
            base: API_BASE.to_string(),
            client,
            timeout: Duration::from_secs(15),
        }
    }

    /// Test hook for pointing the client at a mock server.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base.trim_end_matches('/'), self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T> {
        let rsp = self
            .client
            .post(self.api_url(method))
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("calling Telegram {method}"))?;
        let body: ApiResponse<T> = rsp
            .json()
            .await
            .with_context(|| format!("decoding Telegram {method} response"))?;
        if !body.ok {
            bail!(
                "Telegram {method} rejected: {}",
                body.description.as_deref().unwrap_or("no description")
            );
        }
        body.result
            .with_context(|| format!("Telegram {method} response carried no result"))
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<()> {
        let mut payload = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }
        let _: Value = self.call("sendMessage", &payload, self.timeout).await?;
        Ok(())
    }

    pub async fn send_photo(&self, chat_id: i64, photo_url: &str, caption: &str) -> Result<()> {
        let payload = json!({ "chat_id": chat_id, "photo": photo_url, "caption": caption });
        let _: Value = self.call("sendPhoto", &payload, self.timeout).await?;
        Ok(())
    }

    /// Long-polls for updates. The HTTP timeout stretches past the
    /// server-side hold so the poll itself never trips it.
    pub async fn get_updates(&self, offset: i64, poll_secs: u64) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": poll_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call(
            "getUpdates",
            &payload,
            Duration::from_secs(poll_secs) + self.timeout,
        )
        .await
    }

    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let payload = json!({ "callback_query_id": callback_id });
        let _: Value = self.call("answerCallbackQuery", &payload, self.timeout).await?;
        Ok(())
    }

    /// Replaces (or, with `None`, removes) an inline keyboard on a sent
    /// message. Used to retire confirmation prompts once acted on.
    pub async fn edit_message_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        reply_markup: Option<Value>,
    ) -> Result<()> {
        let mut payload = json!({ "chat_id": chat_id, "message_id": message_id });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }
        let _: Value = self
            .call("editMessageReplyMarkup", &payload, self.timeout)
            .await?;
        Ok(())
    }
}

/// Relays posts into the operator chat. Posts with media go out as a
/// photo with the caption attached; if Telegram refuses the photo (dead
/// media URL, oversized file) the same caption is resent as plain text
/// so the post is never lost.
pub struct TelegramNotifier {
    client: TelegramClient,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient, chat_id: i64) -> Self {
        Self { client, chat_id }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_tweet(&self, account: &str, source: &str, tweet: &Tweet) -> Result<()> {
        let caption = format_caption(account, source, tweet);
        if let Some(photo) = tweet.media.first() {
            match self.client.send_photo(self.chat_id, photo, &caption).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(account, error = %e, "photo send failed, falling back to text");
                }
            }
        }
        self.client.send_message(self.chat_id, &caption, None).await
    }
}
