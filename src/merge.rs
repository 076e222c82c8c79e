//! # Feed Merge Engine
//!
//! Pure function over (current feed, seen ledger, incoming batches). No I/O
//! happens here; the pipeline loads and persists around it.
//!
//! Steps:
//! 1. Concatenate batches in arrival order.
//! 2. Admit a candidate iff its id is neither in the ledger nor in the current
//!    feed (an id admitted earlier in the same call counts as seen).
//! 3. Append admitted items to the feed and stable-sort newest-first.
//! 4. Truncate to `max_items`. Evicted ids stay in the ledger.

use std::collections::HashSet;

use crate::model::NormalizedItem;
use crate::seen::SeenState;

/// Default feed retention window.
pub const DEFAULT_MAX_ITEMS: usize = 500;

/// Result of one merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Newest-first, at most `max_items` long.
    pub feed: Vec<NormalizedItem>,
    /// Newly admitted items in their original relative order.
    pub admitted: Vec<NormalizedItem>,
    /// Ledger with every admitted id added.
    pub seen: SeenState,
    /// Items pushed out of the retention window by this merge.
    pub evicted: usize,
}

/// Merge `batches` into `current`.
pub fn merge(
    current: Vec<NormalizedItem>,
    mut seen: SeenState,
    batches: Vec<Vec<NormalizedItem>>,
    max_items: usize,
) -> MergeOutcome {
    let in_feed: HashSet<String> = current.iter().map(|it| it.id.clone()).collect();

    let mut admitted = Vec::new();
    for candidate in batches.into_iter().flatten() {
        if in_feed.contains(&candidate.id) || seen.contains_id(&candidate.id) {
            continue;
        }
        seen.insert_id(candidate.id.clone());
        admitted.push(candidate);
    }

    if admitted.is_empty() && current.len() <= max_items {
        return MergeOutcome {
            feed: current,
            admitted,
            seen,
            evicted: 0,
        };
    }

    let mut feed = current;
    feed.extend(admitted.iter().cloned());
    sort_newest_first(&mut feed);

    let evicted = feed.len().saturating_sub(max_items);
    feed.truncate(max_items);

    MergeOutcome {
        feed,
        admitted,
        seen,
        evicted,
    }
}

/// Stable: equal timestamps keep their relative order.
pub fn sort_newest_first(items: &mut [NormalizedItem]) {
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Collapse duplicate ids, first occurrence wins. Order is preserved.
pub fn dedup_by_id(items: Vec<NormalizedItem>) -> (Vec<NormalizedItem>, usize) {
    let mut seen = HashSet::with_capacity(items.len());
    let before = items.len();
    let out: Vec<NormalizedItem> = items
        .into_iter()
        .filter(|it| seen.insert(it.id.clone()))
        .collect();
    let dropped = before - out.len();
    (out, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;
    use chrono::{Duration, TimeZone, Utc};

    fn item(native: &str, minutes: i64) -> NormalizedItem {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        NormalizedItem::new(
            Source::Twitter,
            native,
            "alice",
            format!("post {native}"),
            base + Duration::minutes(minutes),
        )
    }

    fn ids(items: &[NormalizedItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn empty_batches_are_a_noop() {
        let current = vec![item("2", 2), item("1", 1)];
        let out = merge(current.clone(), SeenState::new(), vec![], 500);
        assert_eq!(out.feed, current);
        assert!(out.admitted.is_empty());
        assert_eq!(out.evicted, 0);
    }

    #[test]
    fn duplicate_within_one_batch_is_admitted_once() {
        let dup = item("1", 0);
        let out = merge(vec![], SeenState::new(), vec![vec![dup.clone(), dup]], 500);
        assert_eq!(ids(&out.feed), ["twitter_1"]);
        assert_eq!(out.admitted.len(), 1);
        assert!(out.seen.contains_id("twitter_1"));
    }

    #[test]
    fn already_seen_ids_are_rejected() {
        let mut seen = SeenState::new();
        seen.insert_id("twitter_9");
        let out = merge(vec![], seen, vec![vec![item("9", 9), item("10", 10)]], 500);
        assert_eq!(ids(&out.admitted), ["twitter_10"]);
    }

    #[test]
    fn ids_in_current_feed_are_rejected_even_without_ledger() {
        let current = vec![item("1", 1)];
        let out = merge(current, SeenState::new(), vec![vec![item("1", 1)]], 500);
        assert_eq!(out.feed.len(), 1);
        assert!(out.admitted.is_empty());
    }

    #[test]
    fn admitted_keep_arrival_order_while_feed_is_sorted() {
        let out = merge(
            vec![item("5", 5)],
            SeenState::new(),
            vec![vec![item("1", 1), item("9", 9)], vec![item("3", 3)]],
            500,
        );
        assert_eq!(ids(&out.admitted), ["twitter_1", "twitter_9", "twitter_3"]);
        assert_eq!(
            ids(&out.feed),
            ["twitter_9", "twitter_5", "twitter_3", "twitter_1"]
        );
    }

    #[test]
    fn equal_timestamps_keep_concatenation_order() {
        let out = merge(
            vec![item("a", 0)],
            SeenState::new(),
            vec![vec![item("b", 0), item("c", 0)]],
            500,
        );
        assert_eq!(ids(&out.feed), ["twitter_a", "twitter_b", "twitter_c"]);
    }

    #[test]
    fn retention_evicts_oldest_and_keeps_them_seen() {
        let mut seen = SeenState::new();
        let current: Vec<_> = (0..500).rev().map(|i| item(&i.to_string(), i)).collect();
        for it in &current {
            seen.insert_id(it.id.clone());
        }
        let incoming = vec![item("n1", 1000), item("n2", 1001), item("n3", 1002)];

        let out = merge(current, seen, vec![incoming], 500);
        assert_eq!(out.feed.len(), 500);
        assert_eq!(out.evicted, 3);
        assert_eq!(out.feed[0].id, "twitter_n3");
        for gone in ["twitter_0", "twitter_1", "twitter_2"] {
            assert!(!out.feed.iter().any(|i| i.id == gone));
            assert!(out.seen.contains_id(gone));
        }

        // Re-fetching an evicted item must not bring it back.
        let again = merge(out.feed, out.seen, vec![vec![item("0", 0)]], 500);
        assert!(again.admitted.is_empty());
    }

    #[test]
    fn dedup_by_id_keeps_first() {
        let mut a = item("1", 1);
        a.content = "first".into();
        let mut b = item("1", 1);
        b.content = "second".into();
        let (out, dropped) = dedup_by_id(vec![a, b, item("2", 2)]);
        assert_eq!(dropped, 1);
        assert_eq!(out[0].content, "first");
        assert_eq!(out.len(), 2);
    }
}
