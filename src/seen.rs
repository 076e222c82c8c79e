//! Seen-set tracker: the durable dedup ledger.
//!
//! Both lists are kept in insertion order so the retention trim can keep the
//! most recently added entries. The hash indexes are rebuilt on load and never
//! serialized.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OrderedSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl OrderedSet {
    fn from_vec(items: Vec<String>) -> Self {
        let mut out = Self::default();
        for it in items {
            out.insert(it);
        }
        out
    }

    fn contains(&self, v: &str) -> bool {
        self.index.contains(v)
    }

    fn insert(&mut self, v: String) -> bool {
        if v.is_empty() || self.index.contains(&v) {
            return false;
        }
        self.index.insert(v.clone());
        self.order.push(v);
        true
    }

    /// Keep the newest `cap` entries plus anything `pinned` says must stay.
    /// Relative order is preserved.
    fn trim(&mut self, cap: usize, pinned: impl Fn(&str) -> bool) -> usize {
        let len = self.order.len();
        if len <= cap {
            return 0;
        }
        let cutoff = len - cap;
        let before = len;
        let mut i = 0usize;
        self.order.retain(|v| {
            let keep = i >= cutoff || pinned(v);
            i += 1;
            keep
        });
        self.index = self.order.iter().cloned().collect();
        before - self.order.len()
    }
}

/// On-disk shape: `{ "ids": [..], "conversations": [..] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SeenFile {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    conversations: Vec<String>,
}

/// Item ids ever admitted and conversation ids already represented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SeenFile", into = "SeenFile")]
pub struct SeenState {
    ids: OrderedSet,
    conversations: OrderedSet,
}

impl From<SeenFile> for SeenState {
    fn from(f: SeenFile) -> Self {
        Self {
            ids: OrderedSet::from_vec(f.ids),
            conversations: OrderedSet::from_vec(f.conversations),
        }
    }
}

impl From<SeenState> for SeenFile {
    fn from(s: SeenState) -> Self {
        Self {
            ids: s.ids.order,
            conversations: s.conversations.order,
        }
    }
}

impl SeenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `true` when the id was not present before.
    pub fn insert_id(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn contains_conversation(&self, id: &str) -> bool {
        self.conversations.contains(id)
    }

    pub fn insert_conversation(&mut self, id: impl Into<String>) -> bool {
        self.conversations.insert(id.into())
    }

    pub fn extend_conversations<I: IntoIterator<Item = String>>(&mut self, ids: I) {
        for id in ids {
            self.conversations.insert(id);
        }
    }

    pub fn id_count(&self) -> usize {
        self.ids.order.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.order.len()
    }

    /// Ids in insertion order (oldest first).
    pub fn ids(&self) -> &[String] {
        &self.ids.order
    }

    pub fn conversations(&self) -> &[String] {
        &self.conversations.order
    }

    /// Bounded-retention trim applied before persisting.
    ///
    /// Keeps the `id_cap` most recent ids and `conversation_cap` most recent
    /// conversations. Ids listed in `feed_ids` always survive, so an item still
    /// present in the feed can never be forgotten by the ledger. Returns the
    /// number of (ids, conversations) removed.
    pub fn trim(
        &mut self,
        id_cap: usize,
        conversation_cap: usize,
        feed_ids: &HashSet<&str>,
    ) -> (usize, usize) {
        let ids = self.ids.trim(id_cap, |v| feed_ids.contains(v));
        let convs = self.conversations.trim(conversation_cap, |_| false);
        (ids, convs)
    }
}
