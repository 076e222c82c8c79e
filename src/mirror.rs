//! Relational mirror sink.
//!
//! Best-effort copy of newly admitted items into a table, keyed by `id`. The
//! feed artifact stays the source of truth; a failed upsert is reported and
//! logged, never retried by the pipeline.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::MirrorCfg;
use crate::model::NormalizedItem;

/// Outcome of one upsert call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub success: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpsertReport {
    pub fn ok(count: usize) -> Self {
        Self {
            success: true,
            count,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            error: Some(error.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait MirrorSink: Send + Sync {
    /// Idempotent upsert keyed by `id`.
    async fn upsert(&self, items: &[NormalizedItem]) -> UpsertReport;
}

/// Collapse duplicate ids before submission, first occurrence wins.
pub fn dedup_for_upsert(items: &[NormalizedItem]) -> Vec<&NormalizedItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().filter(|it| seen.insert(it.id.as_str())).collect()
}

/// PostgREST upsert (`POST /{table}?on_conflict=id` with
/// `Prefer: resolution=merge-duplicates`), as exposed by Supabase.
pub struct PostgrestMirror {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl PostgrestMirror {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
        }
    }

    /// `None` unless both URL and key are configured.
    pub fn from_config(cfg: &MirrorCfg) -> Option<Self> {
        let url = cfg.url.as_deref()?;
        let key = cfg.api_key.as_deref()?;
        Some(Self::new(url, key, cfg.table.clone()))
    }
}

#[derive(Serialize)]
struct Row<'a> {
    id: &'a str,
    source: &'a str,
    author: &'a str,
    content: &'a str,
    url: Option<&'a str>,
    timestamp: String,
    category: Option<&'a str>,
    metadata: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> From<&'a NormalizedItem> for Row<'a> {
    fn from(it: &'a NormalizedItem) -> Self {
        Self {
            id: &it.id,
            source: it.source.as_str(),
            author: &it.author,
            content: &it.content,
            url: it.url.as_deref(),
            timestamp: it.timestamp.to_rfc3339(),
            category: it.category.as_deref(),
            metadata: &it.metadata,
        }
    }
}

#[async_trait::async_trait]
impl MirrorSink for PostgrestMirror {
    async fn upsert(&self, items: &[NormalizedItem]) -> UpsertReport {
        let rows: Vec<Row<'_>> = dedup_for_upsert(items).into_iter().map(Row::from).collect();
        if rows.is_empty() {
            return UpsertReport::ok(0);
        }
        let url = format!("{}/{}?on_conflict=id", self.base_url, self.table);
        let res = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await;

        match res {
            Ok(rsp) if rsp.status().is_success() => UpsertReport::ok(rows.len()),
            Ok(rsp) => {
                let status = rsp.status();
                let body = rsp.text().await.unwrap_or_default();
                UpsertReport::failed(format!("mirror HTTP {status}: {body}"))
            }
            Err(e) => UpsertReport::failed(format!("mirror request failed: {e}")),
        }
    }
}
