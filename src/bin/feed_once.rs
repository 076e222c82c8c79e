//! Run exactly one merge cycle and exit (cron / CI style trigger).
//! Prints the cycle report as JSON; exits non-zero when persistence fails.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use social_feed::config::AppConfig;
use social_feed::pipeline::FeedPipeline;
use social_feed::scheduler::{Scheduler, TriggerKind};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    social_feed::init_tracing();

    let cfg = AppConfig::load_default().context("loading feed config")?;
    let pipeline = Arc::new(FeedPipeline::from_config(&cfg));
    let scheduler = Scheduler::new(pipeline, &cfg.schedule);

    let report = scheduler
        .run_now(TriggerKind::Manual)
        .await?
        .ok_or_else(|| anyhow!("cycle failed; see log for details"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
