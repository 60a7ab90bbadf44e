// src/sources/mod.rs
pub mod nitter;
pub mod syndication;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One post as normalized from whichever upstream served it.
/// Produced fresh on every fetch and never mutated; only the `id` outlives
/// the fetch (into the seen-id set).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Tweet {
    /// Source-assigned status id, unique within an account's timeline.
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Image URLs in source order; may be empty.
    pub media: Vec<String>,
}

/// Successful outcome of one source fetch for one account.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FetchResult {
    /// Human-readable label of the upstream that served the data,
    /// e.g. "Nitter (nitter.net)". Shown in the notification caption.
    pub source: String,
    pub tweets: Vec<Tweet>,
}

/// A single fetch strategy against one mirror family.
///
/// `None` means the source could not produce usable data right now;
/// transport and parse failures are logged and swallowed at this layer.
/// Escalation (retry across the whole source list) is the orchestrator's
/// job.
#[async_trait]
pub trait FetchSource: Send + Sync {
    async fn fetch(&self, account: &str) -> Option<FetchResult>;
    fn name(&self) -> &'static str;
}

/// Cache key shared by all sources: `<sourceName>:<account>`.
pub fn cache_key(source: &str, account: &str) -> String {
    format!("{source}:{account}")
}

/// Normalize upstream text: decode HTML entities, strip tags, collapse
/// whitespace, trim. No length cap here; the caption formatter truncates
/// for display.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}
