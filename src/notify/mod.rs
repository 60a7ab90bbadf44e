pub mod telegram;

use async_trait::async_trait;
use chrono::Local;

use crate::sources::Tweet;

/// Telegram rejects photo captions over 1024 chars; 800 leaves room for
/// the header and footer lines around the post text.
pub const CAPTION_TEXT_LIMIT: usize = 800;

pub const CANONICAL_SITE: &str = "https://x.com";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_tweet(&self, account: &str, source: &str, tweet: &Tweet) -> anyhow::Result<()>;
}

pub fn permalink(account: &str, id: &str) -> String {
    format!("{CANONICAL_SITE}/{account}/status/{id}")
}

/// Builds the message caption. Pure so the truncation and escaping rules
/// stay testable away from the send path.
pub fn format_caption(account: &str, source: &str, tweet: &Tweet) -> String {
    let text: String = tweet
        .text
        .replace("&amp;", "&")
        .chars()
        .take(CAPTION_TEXT_LIMIT)
        .collect();
    let when = tweet
        .created_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    format!(
        "@{account} posted:\n{source}\n\n{text}\n\n{when} • {link}",
        link = permalink(account, &tweet.id)
    )
}
