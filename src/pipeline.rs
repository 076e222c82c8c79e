//! One merge cycle, end to end:
//! load → fetch (concurrent, isolated) → thread filter → merge → save → sinks.
//!
//! The pipeline holds no feed state between cycles; everything durable goes
//! through [`FeedStore`]. Callers must not run two cycles at once (the
//! scheduler's gate enforces this).

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::ingest::fetch_all;
use crate::ingest::providers::{github::GithubProvider, reddit::RedditProvider, twitter::TwitterProvider};
use crate::ingest::types::{FetchOutcome, SourceProvider};
use crate::merge::{merge, MergeOutcome, DEFAULT_MAX_ITEMS};
use crate::metrics as feed_metrics;
use crate::mirror::{MirrorSink, PostgrestMirror, UpsertReport};
use crate::notify::NotifierMux;
use crate::store::{FeedStore, LoadStatus};
use crate::threads::{filter_threads, ConversationTracker};

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: &'static str,
    pub fetched: usize,
    pub kept: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub degraded_start: bool,
    pub sources: Vec<SourceSummary>,
    pub admitted: usize,
    pub evicted: usize,
    pub feed_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<UpsertReport>,
    pub notify_failures: usize,
}

pub struct FeedPipeline {
    providers: Vec<Arc<dyn SourceProvider>>,
    store: FeedStore,
    excluded_authors: Vec<String>,
    max_items: usize,
    notifier: NotifierMux,
    mirror: Option<Arc<dyn MirrorSink>>,
}

impl FeedPipeline {
    pub fn new(store: FeedStore, providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self {
            providers,
            store,
            excluded_authors: Vec::new(),
            max_items: DEFAULT_MAX_ITEMS,
            notifier: NotifierMux::default(),
            mirror: None,
        }
    }

    pub fn with_excluded_authors(mut self, authors: Vec<String>) -> Self {
        self.excluded_authors = authors;
        self
    }

    pub fn with_max_items(mut self, n: usize) -> Self {
        self.max_items = n.max(1);
        self
    }

    pub fn with_notifier(mut self, mux: NotifierMux) -> Self {
        self.notifier = mux;
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Wire providers and sinks from configuration. Sources with nothing to
    /// search for are left out.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let f = &cfg.feed;
        let store = FeedStore::new(&f.path, &f.seen_path).with_caps(f.seen_cap, f.conversation_cap);

        let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();
        if cfg.twitter.enabled && !cfg.twitter.search_terms.is_empty() {
            providers.push(Arc::new(TwitterProvider::from_config(&cfg.twitter, f.content_max_chars)));
        }
        if cfg.reddit.enabled && !cfg.reddit.queries.is_empty() {
            providers.push(Arc::new(RedditProvider::from_config(&cfg.reddit, f.content_max_chars)));
        }
        if cfg.github.enabled && !cfg.github.queries.is_empty() {
            providers.push(Arc::new(GithubProvider::from_config(&cfg.github, f.content_max_chars)));
        }
        if providers.is_empty() {
            tracing::warn!("no sources configured; cycles will only re-persist the current feed");
        }

        let mut p = Self::new(store, providers)
            .with_excluded_authors(f.excluded_authors.clone())
            .with_max_items(f.max_items)
            .with_notifier(NotifierMux::from_config(&cfg.notify));
        if let Some(m) = PostgrestMirror::from_config(&cfg.mirror) {
            p = p.with_mirror(Arc::new(m));
        }
        p
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run one cycle. Only a persistence failure is an error; source and
    /// sink failures are folded into the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let t0 = Instant::now();
        let started_at = Utc::now();

        let loaded = self.store.load().await;
        let degraded_start =
            loaded.feed_status == LoadStatus::Corrupt || loaded.seen_status == LoadStatus::Corrupt;
        if degraded_start {
            tracing::warn!(
                target: "pipeline",
                feed = ?loaded.feed_status,
                seen = ?loaded.seen_status,
                "degraded start: continuing from empty state"
            );
        }

        let reports = fetch_all(&self.providers).await;

        let mut tracker = ConversationTracker::from_ledger(&loaded.seen);
        let mut sources = Vec::with_capacity(reports.len());
        let mut batches = Vec::with_capacity(reports.len());
        for report in reports {
            let name = report.source;
            let error = match &report.outcome {
                FetchOutcome::Failed { reason } => Some(reason.clone()),
                FetchOutcome::Fetched(_) => None,
            };
            let fetched = report.fetched_count();
            let threaded = report.threaded;
            let mut items = report.into_items();
            if threaded {
                items = filter_threads(items, &self.excluded_authors, &mut tracker).0;
            }
            sources.push(SourceSummary {
                source: name,
                fetched,
                kept: items.len(),
                error,
            });
            batches.push(items);
        }

        let MergeOutcome {
            feed,
            admitted,
            mut seen,
            evicted,
        } = merge(loaded.feed, loaded.seen, batches, self.max_items);
        seen.extend_conversations(tracker.into_recorded());

        if let Err(e) = self.store.save(&feed, &mut seen).await {
            feed_metrics::cycle_failed();
            return Err(e).context("persisting feed state");
        }

        let mirror = match (&self.mirror, admitted.is_empty()) {
            (Some(m), false) => {
                let r = m.upsert(&admitted).await;
                if !r.success {
                    feed_metrics::sink_error("mirror");
                    tracing::warn!(
                        target: "pipeline",
                        error = r.error.as_deref().unwrap_or_default(),
                        "mirror upsert failed"
                    );
                }
                Some(r)
            }
            _ => None,
        };
        let notify_failures = self.notifier.notify(&admitted).await;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        feed_metrics::cycle_finished(admitted.len(), feed.len(), elapsed_ms as f64, Utc::now().timestamp());
        tracing::info!(
            target: "pipeline",
            admitted = admitted.len(),
            evicted,
            feed_len = feed.len(),
            failed_sources = sources.iter().filter(|s| s.error.is_some()).count(),
            elapsed_ms,
            "cycle complete"
        );

        Ok(CycleReport {
            started_at,
            elapsed_ms,
            degraded_start,
            sources,
            admitted: admitted.len(),
            evicted,
            feed_len: feed.len(),
            mirror,
            notify_failures,
        })
    }
}
