//! # Persistence Adapter
//!
//! Loads and saves the feed artifact (`feed.json`) and the seen ledger
//! (`seen.json`).
//!
//! - `load` never fails: a missing or corrupt artifact degrades to empty state
//!   and is logged, so the pipeline heals itself after a bad write.
//! - `save` trims the ledger, then writes the feed first and the ledger second,
//!   each through a temp file + rename. A failure leaves the previous artifact
//!   in place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;

use crate::merge::{dedup_by_id, sort_newest_first};
use crate::model::NormalizedItem;
use crate::seen::SeenState;

pub const DEFAULT_SEEN_CAP: usize = 1000;
pub const DEFAULT_CONVERSATION_CAP: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("creating directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serializing {what}: {source}")]
    Serialize {
        what: &'static str,
        source: serde_json::Error,
    },
}

/// How a load went. Anything but `Loaded` means the cycle starts degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Missing,
    Corrupt,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub feed: Vec<NormalizedItem>,
    pub seen: SeenState,
    pub feed_status: LoadStatus,
    pub seen_status: LoadStatus,
}

#[derive(Debug, Clone)]
pub struct FeedStore {
    feed_path: PathBuf,
    seen_path: PathBuf,
    seen_cap: usize,
    conversation_cap: usize,
}

impl FeedStore {
    pub fn new(feed_path: impl Into<PathBuf>, seen_path: impl Into<PathBuf>) -> Self {
        Self {
            feed_path: feed_path.into(),
            seen_path: seen_path.into(),
            seen_cap: DEFAULT_SEEN_CAP,
            conversation_cap: DEFAULT_CONVERSATION_CAP,
        }
    }

    pub fn with_caps(mut self, seen_cap: usize, conversation_cap: usize) -> Self {
        self.seen_cap = seen_cap;
        self.conversation_cap = conversation_cap;
        self
    }

    pub fn feed_path(&self) -> &Path {
        &self.feed_path
    }

    pub fn seen_path(&self) -> &Path {
        &self.seen_path
    }

    /// Load both artifacts, degrading to empty state on any problem.
    pub async fn load(&self) -> Loaded {
        let (feed, feed_status) = read_json::<Vec<NormalizedItem>>(&self.feed_path).await;
        let (seen, seen_status) = read_json::<SeenState>(&self.seen_path).await;

        // Keep the engine's invariants even if someone edited the file by hand.
        let (mut feed, dupes) = dedup_by_id(feed);
        if dupes > 0 {
            tracing::warn!(
                target: "store",
                dupes,
                path = %self.feed_path.display(),
                "persisted feed contained duplicate ids; kept first occurrence"
            );
        }
        sort_newest_first(&mut feed);

        let mut seen = seen;
        let mut reseeded = 0usize;
        let mut reseeded_convs = 0usize;
        for it in &feed {
            if seen.insert_id(it.id.clone()) {
                reseeded += 1;
            }
            if let Some(conv) = it.conversation_id() {
                if seen.insert_conversation(conv) {
                    reseeded_convs += 1;
                }
            }
        }
        if reseeded + reseeded_convs > 0 {
            tracing::warn!(
                target: "store",
                reseeded,
                reseeded_convs,
                "ledger was missing entries for items still in the feed; re-recorded them"
            );
        }

        Loaded {
            feed,
            seen,
            feed_status,
            seen_status,
        }
    }

    /// Trim the ledger and persist feed, then ledger.
    pub async fn save(&self, feed: &[NormalizedItem], seen: &mut SeenState) -> Result<(), StoreError> {
        let feed_ids: HashSet<&str> = feed.iter().map(|it| it.id.as_str()).collect();
        let (ids_trimmed, convs_trimmed) =
            seen.trim(self.seen_cap, self.conversation_cap, &feed_ids);
        if ids_trimmed + convs_trimmed > 0 {
            tracing::debug!(
                target: "store",
                ids_trimmed,
                convs_trimmed,
                "seen ledger trimmed before save"
            );
        }

        let feed_json = serde_json::to_vec_pretty(feed)
            .map_err(|source| StoreError::Serialize { what: "feed", source })?;
        let seen_json = serde_json::to_vec_pretty(&*seen)
            .map_err(|source| StoreError::Serialize { what: "seen", source })?;

        write_atomic(&self.feed_path, &feed_json).await?;
        write_atomic(&self.seen_path, &seen_json).await?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> (T, LoadStatus) {
    let raw = match fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(target: "store", path = %path.display(), "no artifact yet; starting empty");
            return (T::default(), LoadStatus::Missing);
        }
        Err(e) => {
            tracing::warn!(target: "store", path = %path.display(), error = %e, "artifact unreadable; starting empty");
            return (T::default(), LoadStatus::Corrupt);
        }
    };
    if raw.trim().is_empty() {
        tracing::warn!(target: "store", path = %path.display(), "artifact empty; starting empty");
        return (T::default(), LoadStatus::Corrupt);
    }
    match serde_json::from_str(&raw) {
        Ok(v) => (v, LoadStatus::Loaded),
        Err(e) => {
            tracing::warn!(target: "store", path = %path.display(), error = %e, "artifact corrupt; starting empty");
            (T::default(), LoadStatus::Corrupt)
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
    }
    let tmp = tmp_path(path);
    let write = async {
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await
    };
    if let Err(source) = write.await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
