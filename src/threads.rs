// src/threads.rs
//! Conversation thread filter for sources with reply chains.
//!
//! Runs on a single source's batch before the merge. Only the first item per
//! conversation survives, across cycles (via the ledger) and within a batch
//! (via the in-memory tracker).

use std::collections::HashSet;

use crate::metrics as feed_metrics;
use crate::model::NormalizedItem;
use crate::seen::SeenState;

/// In-memory view of conversations seen so far this cycle.
///
/// Seeded from the durable ledger; newly recorded ids are kept in order so the
/// pipeline can fold them into `SeenState` once the cycle completes.
#[derive(Debug, Default, Clone)]
pub struct ConversationTracker {
    seen: HashSet<String>,
    recorded: Vec<String>,
}

impl ConversationTracker {
    pub fn from_ledger(ledger: &SeenState) -> Self {
        Self {
            seen: ledger.conversations().iter().cloned().collect(),
            recorded: Vec::new(),
        }
    }

    pub fn is_seen(&self, conversation_id: &str) -> bool {
        self.seen.contains(conversation_id)
    }

    /// Returns `false` if the conversation was already known.
    pub fn record(&mut self, conversation_id: String) -> bool {
        if !self.seen.insert(conversation_id.clone()) {
            return false;
        }
        self.recorded.push(conversation_id);
        true
    }

    /// Conversations first seen during this cycle, in discovery order.
    pub fn recorded(&self) -> &[String] {
        &self.recorded
    }

    pub fn into_recorded(self) -> Vec<String> {
        self.recorded
    }
}

/// Counters for one filtering pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadFilterStats {
    pub excluded_author: usize,
    pub collapsed: usize,
}

fn is_excluded(author: &str, excluded: &[String]) -> bool {
    let a = author.trim().trim_start_matches('@');
    excluded
        .iter()
        .any(|e| e.trim().trim_start_matches('@').eq_ignore_ascii_case(a))
}

/// Drop posts by excluded authors and posts whose conversation is already
/// represented. Surviving conversation ids are recorded into `tracker`.
pub fn filter_threads(
    items: Vec<NormalizedItem>,
    excluded_authors: &[String],
    tracker: &mut ConversationTracker,
) -> (Vec<NormalizedItem>, ThreadFilterStats) {
    let mut stats = ThreadFilterStats::default();
    let mut kept = Vec::with_capacity(items.len());

    for it in items {
        if is_excluded(&it.author, excluded_authors) {
            stats.excluded_author += 1;
            continue;
        }
        if let Some(conv) = it.conversation_id() {
            if tracker.is_seen(&conv) {
                stats.collapsed += 1;
                continue;
            }
            tracker.record(conv);
        }
        kept.push(it);
    }

    if stats.excluded_author + stats.collapsed > 0 {
        feed_metrics::thread_filtered(stats.excluded_author + stats.collapsed);
        tracing::debug!(
            target: "pipeline",
            excluded = stats.excluded_author,
            collapsed = stats.collapsed,
            kept = kept.len(),
            "thread filter pass"
        );
    }

    (kept, stats)
}
