//! Feed service entrypoint.
//! Boots the Axum HTTP server, the periodic merge scheduler, and /metrics.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use social_feed::api::{self, AppState};
use social_feed::config::AppConfig;
use social_feed::metrics::Metrics;
use social_feed::pipeline::FeedPipeline;
use social_feed::scheduler::Scheduler;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    social_feed::init_tracing();

    let cfg = AppConfig::load_default().context("loading feed config")?;
    let metrics = Metrics::init()?;

    let pipeline = Arc::new(FeedPipeline::from_config(&cfg));
    tracing::info!(
        sources = ?pipeline.source_names(),
        feed = %cfg.feed.path.display(),
        max_items = cfg.feed.max_items,
        "feed pipeline ready"
    );

    let scheduler = Scheduler::new(pipeline, &cfg.schedule);
    scheduler.spawn(cfg.schedule.run_on_start);

    let router = api::create_router(AppState { scheduler }).merge(metrics.router());
    Ok(router.into())
}
