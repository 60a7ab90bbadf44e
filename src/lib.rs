// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod bot;
pub mod cache;
pub mod config;
pub mod context;
pub mod fetcher;
pub mod health;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod sources;
pub mod state;
pub mod storage;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::AppConfig;
pub use crate::context::AppContext;
