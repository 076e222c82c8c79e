// src/ingest/types.rs
use anyhow::Result;

use crate::model::NormalizedItem;

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NormalizedItem>>;
    fn name(&self) -> &'static str;
    /// Whether the conversation thread filter applies to this source.
    fn threaded(&self) -> bool {
        false
    }
}

/// Explicit per-source result. The merge engine only ever sees the items.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(Vec<NormalizedItem>),
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: &'static str,
    pub threaded: bool,
    pub outcome: FetchOutcome,
}

impl SourceReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Failed { .. })
    }

    pub fn fetched_count(&self) -> usize {
        match &self.outcome {
            FetchOutcome::Fetched(v) => v.len(),
            FetchOutcome::Failed { .. } => 0,
        }
    }

    /// A failed source contributes an empty batch.
    pub fn into_items(self) -> Vec<NormalizedItem> {
        match self.outcome {
            FetchOutcome::Fetched(v) => v,
            FetchOutcome::Failed { .. } => Vec::new(),
        }
    }
}
