use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::fetcher::FetchOrchestrator;
use crate::health::HealthStats;
use crate::notify::telegram::{TelegramClient, TelegramNotifier};
use crate::notify::Notifier;
use crate::sources::nitter::NitterRssSource;
use crate::sources::syndication::SyndicationSource;
use crate::sources::FetchSource;
use crate::state::{is_valid_handle, MonitorState};
use crate::storage::Storage;

// Mirror hosts tend to reject the default reqwest agent string.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Everything the scheduler, bot loop, and HTTP surface share. Cheap to
/// clone; all mutable pieces sit behind their own locks.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub cache: Arc<ResponseCache>,
    pub state: Arc<Mutex<MonitorState>>,
    pub storage: Arc<Storage>,
    pub fetcher: Arc<FetchOrchestrator>,
    pub telegram: TelegramClient,
    pub notifier: Arc<dyn Notifier>,
    pub health: Arc<HealthStats>,
}

impl AppContext {
    /// Wires the whole pipeline together and restores persisted state.
    /// The configured seed accounts apply only when no account document
    /// exists yet.
    pub fn initialize(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("building http client")?;

        let cache = Arc::new(ResponseCache::new(config.cache_ttl));
        let storage = Arc::new(Storage::new(&config.state_dir));

        let accounts = match storage.load_accounts() {
            Some(list) => list,
            None => {
                let seeds: Vec<String> = config
                    .seed_accounts
                    .iter()
                    .filter(|h| {
                        let ok = is_valid_handle(h);
                        if !ok {
                            tracing::warn!(handle = %h, "ignoring invalid seed account");
                        }
                        ok
                    })
                    .cloned()
                    .collect();
                if !seeds.is_empty() {
                    tracing::info!(count = seeds.len(), "no persisted account list, seeding from configuration");
                }
                seeds
            }
        };
        let state = MonitorState::from_parts(
            accounts,
            storage.load_seen_ids(),
            storage.load_bootstrap(),
        );
        tracing::info!(
            accounts = state.tracked_count(),
            seen_ids = state.seen_count(),
            "monitor state ready"
        );

        let sources: Vec<Box<dyn FetchSource>> = vec![
            Box::new(NitterRssSource::new(
                client.clone(),
                config.nitter_mirrors.clone(),
                cache.clone(),
            )),
            Box::new(SyndicationSource::new(client.clone(), cache.clone())),
        ];
        let fetcher = Arc::new(FetchOrchestrator::new(sources, config.max_retries));
        tracing::info!(
            sources = ?fetcher.source_names(),
            mirrors = config.nitter_mirrors.len(),
            "fetch chain ready"
        );

        let telegram = TelegramClient::new(config.bot_token.clone(), client);
        let notifier: Arc<dyn Notifier> =
            Arc::new(TelegramNotifier::new(telegram.clone(), config.chat_id));

        Ok(Self {
            config,
            cache,
            state: Arc::new(Mutex::new(state)),
            storage,
            fetcher,
            telegram,
            notifier,
            health: Arc::new(HealthStats::new()),
        })
    }
}
