// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod mirror;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod seen;
pub mod store;
pub mod threads;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::AppConfig;
pub use crate::model::{NormalizedItem, Source};
pub use crate::pipeline::{CycleReport, FeedPipeline};
pub use crate::scheduler::{Scheduler, TriggerKind};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// set `FEED_LOG_JSON=1` for one JSON object per line. Safe to call twice.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("social_feed=info,warn"));
    let json = std::env::var("FEED_LOG_JSON").ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
