use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use rand::seq::SliceRandom;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::cache::ResponseCache;
use crate::sources::{cache_key, normalize_text, FetchResult, FetchSource, Tweet};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    // An account with no posts serves a channel with no <item> elements;
    // that is an empty feed, not a mirror failure.
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> DateTime<Utc> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}

/// Fetches an account's timeline as RSS from a rotation of Nitter mirrors.
///
/// Mirrors are tried in randomized order so a single dead instance does not
/// get hammered first on every fetch. The first mirror that returns a
/// parseable feed wins; everything else is skipped for this fetch.
pub struct NitterRssSource {
    mirrors: Vec<String>,
    client: reqwest::Client,
    cache: Arc<ResponseCache>,
    timeout: Duration,
}

impl NitterRssSource {
    pub fn new(client: reqwest::Client, mirrors: Vec<String>, cache: Arc<ResponseCache>) -> Self {
        Self {
            mirrors,
            client,
            cache,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn try_mirror(&self, mirror: &str, account: &str) -> anyhow::Result<Vec<Tweet>> {
        let url = format!("{}/{}/rss", mirror.trim_end_matches('/'), account);
        let body = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl FetchSource for NitterRssSource {
    async fn fetch(&self, account: &str) -> Option<FetchResult> {
        let key = cache_key(self.name(), account);
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }

        let mut mirrors = self.mirrors.clone();
        mirrors.shuffle(&mut rand::rng());

        for mirror in &mirrors {
            match self.try_mirror(mirror, account).await {
                Ok(tweets) => {
                    let result = FetchResult {
                        source: format!("Nitter ({})", host_label(mirror)),
                        tweets,
                    };
                    self.cache.set(&key, result.clone());
                    return Some(result);
                }
                Err(e) => {
                    tracing::debug!(account, mirror, error = ?e, "nitter mirror failed");
                    counter!("relay_mirror_errors_total").increment(1);
                }
            }
        }

        None
    }

    fn name(&self) -> &'static str {
        "nitter"
    }
}

/// Parse a Nitter RSS document into normalized tweets.
///
/// Replies (titles prefixed `R to @...`) and items without a recoverable
/// status id are dropped.
pub fn parse_feed(xml: &str) -> anyhow::Result<Vec<Tweet>> {
    use anyhow::Context;

    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing nitter rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = it.title.as_deref().unwrap_or_default();
        if title.trim_start().starts_with("R to @") {
            continue;
        }

        let id = match it.link.as_deref().and_then(status_id_from_link) {
            Some(id) => id,
            None => continue,
        };

        let raw_text = if title.trim().is_empty() {
            it.description.as_deref().unwrap_or_default()
        } else {
            title
        };
        let text = normalize_text(raw_text);

        out.push(Tweet {
            id,
            text,
            created_at: it
                .pub_date
                .as_deref()
                .map(parse_rfc2822)
                .unwrap_or_default(),
            media: media_urls(it.description.as_deref().unwrap_or_default()),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("relay_source_parse_ms").record(ms);
    counter!("relay_source_items_total").increment(out.len() as u64);
    Ok(out)
}

fn status_id_from_link(link: &str) -> Option<String> {
    static RE_ID: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE_ID.get_or_init(|| regex::Regex::new(r"/status/(\d+)").unwrap());
    re.captures(link).map(|c| c[1].to_string())
}

fn media_urls(description: &str) -> Vec<String> {
    static RE_IMG: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE_IMG.get_or_init(|| regex::Regex::new(r#"<img[^>]*src="([^"]+)""#).unwrap());
    re.captures_iter(description)
        .map(|c| c[1].to_string())
        .collect()
}

fn host_label(mirror: &str) -> &str {
    mirror
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// Mirrors embed HTML entities in item descriptions that are not valid XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
