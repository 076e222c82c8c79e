// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::sync::Arc;

use futures::future::join_all;

use crate::ingest::types::{FetchOutcome, SourceProvider, SourceReport};
use crate::metrics as feed_metrics;

/// Fetch one provider, turning any error into a `Failed` outcome.
/// Nothing escapes this boundary.
pub async fn fetch_isolated(provider: &dyn SourceProvider) -> SourceReport {
    let t0 = std::time::Instant::now();
    let outcome = match provider.fetch_latest().await {
        Ok(items) => {
            tracing::info!(
                target: "ingest",
                source = provider.name(),
                fetched = items.len(),
                ms = t0.elapsed().as_millis() as u64,
                "source fetched"
            );
            FetchOutcome::Fetched(items)
        }
        Err(e) => {
            tracing::warn!(target: "ingest", error = ?e, source = provider.name(), "source error");
            feed_metrics::source_error(provider.name());
            FetchOutcome::Failed {
                reason: format!("{e:#}"),
            }
        }
    };
    SourceReport {
        source: provider.name(),
        threaded: provider.threaded(),
        outcome,
    }
}

/// Fetch every provider concurrently. Outcomes are awaited independently, so
/// one slow or failing source never cancels the others. Reports come back in
/// provider order.
pub async fn fetch_all(providers: &[Arc<dyn SourceProvider>]) -> Vec<SourceReport> {
    join_all(providers.iter().map(|p| fetch_isolated(p.as_ref()))).await
}
