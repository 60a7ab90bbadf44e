use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::cache::CacheStats;
use crate::context::AppContext;

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(CorsLayer::very_permissive())
        .with_state(ctx)
}

#[derive(serde::Serialize)]
struct HealthResp {
    status: &'static str,
    version: &'static str,
    mode: &'static str,
    users: usize,
    cache: CacheStats,
    #[serde(rename = "tweetsTracked")]
    tweets_tracked: usize,
    uptime: String,
    #[serde(rename = "lastCheck")]
    last_check: Option<String>,
    #[serde(rename = "failureRate")]
    failure_rate: String,
}

async fn health(State(ctx): State<AppContext>) -> Json<HealthResp> {
    let (users, tweets_tracked) = {
        let state = ctx.state.lock().await;
        (state.tracked_count(), state.seen_count())
    };
    let report = ctx.health.report();
    Json(HealthResp {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: "polling",
        users,
        cache: ctx.cache.stats(),
        tweets_tracked,
        uptime: report.uptime,
        last_check: report.last_check,
        failure_rate: report.failure_rate,
    })
}
