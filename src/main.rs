//! Tweet Relay Bot — Binary Entrypoint
//! Boots the fetch pipeline, the chat control loop, and the HTTP surface.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tweet_relay_bot::metrics::Metrics;
use tweet_relay_bot::{api, bot, scheduler, AppConfig, AppContext};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tweet_relay_bot=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the variables come from the
    // real environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    let metrics = Metrics::init(config.cache_ttl.as_millis() as u64);
    let port = config.port;

    let ctx = AppContext::initialize(config)?;

    // HTTP surface: /health plus the Prometheus exposition endpoint.
    let router = api::create_router(ctx.clone()).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "http surface listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "http server stopped");
        }
    });

    tokio::spawn(bot::run(ctx.clone()));

    tokio::select! {
        _ = scheduler::run(ctx.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, persisting state");
            persist_on_shutdown(&ctx).await;
        }
    }
    Ok(())
}

async fn persist_on_shutdown(ctx: &AppContext) {
    let (accounts, seen, bootstrap) = {
        let state = ctx.state.lock().await;
        (
            state.accounts_snapshot(),
            state.seen_snapshot(),
            state.bootstrap_snapshot(),
        )
    };
    if let Err(e) = ctx.storage.save_accounts(&accounts) {
        tracing::warn!(error = %e, "accounts not persisted");
    }
    if let Err(e) = ctx.storage.save_seen_ids(&seen) {
        tracing::warn!(error = %e, "seen ids not persisted");
    }
    if let Err(e) = ctx.storage.save_bootstrap(&bootstrap) {
        tracing::warn!(error = %e, "bootstrap map not persisted");
    }
}
