use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::cache::ResponseCache;
use crate::sources::{cache_key, normalize_text, FetchResult, FetchSource, Tweet};

const DEFAULT_ENDPOINT: &str = "https://syndication.twitter.com/srv/timeline-profile/screen-name";

// The timeline page embeds its data as JSON in a __NEXT_DATA__ script tag.
#[derive(Debug, Deserialize)]
struct NextData {
    props: Props,
}

#[derive(Debug, Deserialize)]
struct Props {
    #[serde(rename = "pageProps")]
    page_props: PageProps,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    timeline: Timeline,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    tweet: Option<RawTweet>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTweet {
    #[serde(default)]
    id_str: Option<String>,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    entities: Option<Entities>,
}

#[derive(Debug, Default, Deserialize)]
struct Entities {
    #[serde(default)]
    media: Vec<MediaEntity>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaEntity {
    #[serde(default)]
    media_url_https: Option<String>,
}

/// Fetches an account's recent posts from the X syndication timeline (the
/// endpoint that backs embedded timeline widgets). A single host, no
/// mirrors; when it is blocked the whole source simply yields nothing.
pub struct SyndicationSource {
    endpoint: String,
    client: reqwest::Client,
    cache: Arc<ResponseCache>,
    timeout: Duration,
}

impl SyndicationSource {
    pub fn new(client: reqwest::Client, cache: Arc<ResponseCache>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client,
            cache,
            timeout: Duration::from_secs(10),
        }
    }

    /// Test/operations hook for pointing the source at a different host.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn try_fetch(&self, account: &str) -> anyhow::Result<Vec<Tweet>> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), account);
        let body = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_timeline_page(&body)
    }
}

#[async_trait]
impl FetchSource for SyndicationSource {
    async fn fetch(&self, account: &str) -> Option<FetchResult> {
        let key = cache_key(self.name(), account);
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        match self.try_fetch(account).await {
            Ok(tweets) => {
                let result = FetchResult {
                    source: "Syndication API".to_string(),
                    tweets,
                };
                self.cache.set(&key, result.clone());
                Some(result)
            }
            Err(e) => {
                tracing::debug!(account, error = ?e, "syndication fetch failed");
                counter!("relay_mirror_errors_total").increment(1);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "syndication"
    }
}

/// Extract the embedded timeline JSON and normalize its tweet entries.
/// Replies and entries without an id are dropped.
pub fn parse_timeline_page(html: &str) -> anyhow::Result<Vec<Tweet>> {
    use anyhow::Context;

    let t0 = std::time::Instant::now();

    static RE_DATA: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE_DATA.get_or_init(|| {
        regex::Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json"[^>]*>(.*?)</script>"#)
            .unwrap()
    });

    let raw = re
        .captures(html)
        .map(|c| c[1].to_string())
        .context("timeline page has no __NEXT_DATA__ payload")?;
    let data: NextData =
        serde_json::from_str(&raw).context("parsing syndication timeline json")?;

    let entries = data.props.page_props.timeline.entries;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        if !entry.kind.is_empty() && entry.kind != "tweet" {
            continue;
        }
        let Some(tweet) = entry.content.and_then(|c| c.tweet) else {
            continue;
        };
        if tweet.in_reply_to_status_id_str.is_some() {
            continue;
        }
        let Some(id) = tweet.id_str.filter(|s| !s.is_empty()) else {
            continue;
        };

        let raw_text = tweet
            .full_text
            .or(tweet.text)
            .unwrap_or_default();

        out.push(Tweet {
            id,
            text: normalize_text(&raw_text),
            created_at: tweet
                .created_at
                .as_deref()
                .map(parse_tweet_time)
                .unwrap_or_default(),
            media: tweet
                .entities
                .unwrap_or_default()
                .media
                .into_iter()
                .filter_map(|m| m.media_url_https)
                .collect(),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("relay_source_parse_ms").record(ms);
    counter!("relay_source_items_total").increment(out.len() as u64);
    Ok(out)
}

/// The endpoint serves legacy API timestamps ("Mon Oct 21 07:28:00 +0000
/// 2024"); newer payload variants use RFC 3339. Try both, fall back to
/// the epoch so a bad date never drops an item.
fn parse_tweet_time(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_str(ts, "%a %b %d %H:%M:%S %z %Y")
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
