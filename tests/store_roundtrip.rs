// tests/store_roundtrip.rs
//
// Persistence adapter against a real filesystem (tempdir per test).

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use social_feed::model::{NormalizedItem, Source, CONVERSATION_ID_KEY};
use social_feed::seen::SeenState;
use social_feed::store::{FeedStore, LoadStatus};

fn item(n: i64) -> NormalizedItem {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    NormalizedItem::new(
        Source::Github,
        &n.to_string(),
        "octocat",
        format!("issue {n}"),
        base + Duration::minutes(n),
    )
    .with_meta("state", "open")
}

fn store_in(dir: &TempDir) -> FeedStore {
    FeedStore::new(dir.path().join("data/feed.json"), dir.path().join("data/seen.json"))
}

#[tokio::test]
async fn first_run_loads_empty_and_reports_missing() {
    let dir = TempDir::new().unwrap();
    let loaded = store_in(&dir).load().await;
    assert!(loaded.feed.is_empty());
    assert_eq!(loaded.seen.id_count(), 0);
    assert_eq!(loaded.feed_status, LoadStatus::Missing);
    assert_eq!(loaded.seen_status, LoadStatus::Missing);
}

#[tokio::test]
async fn save_then_load_preserves_feed_and_ledger() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let feed = vec![item(3), item(2), item(1)];
    let mut seen = SeenState::new();
    for it in &feed {
        seen.insert_id(it.id.clone());
    }
    seen.insert_id("github_0");
    seen.insert_conversation("conv-1");

    store.save(&feed, &mut seen).await.unwrap();

    let loaded = store.load().await;
    assert_eq!(loaded.feed_status, LoadStatus::Loaded);
    assert_eq!(loaded.seen_status, LoadStatus::Loaded);
    assert_eq!(loaded.feed, feed);
    assert!(loaded.seen.contains_id("github_0"));
    assert!(loaded.seen.contains_conversation("conv-1"));

    // no temp files left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("data"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");
}

#[tokio::test]
async fn corrupt_feed_degrades_to_empty_but_keeps_ledger() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let mut seen = SeenState::new();
    seen.insert_id("github_9");
    store.save(&[item(9)], &mut seen).await.unwrap();

    std::fs::write(store.feed_path(), b"[{\"id\": \"truncated").unwrap();

    let loaded = store.load().await;
    assert_eq!(loaded.feed_status, LoadStatus::Corrupt);
    assert!(loaded.feed.is_empty());
    assert_eq!(loaded.seen_status, LoadStatus::Loaded);
    assert!(loaded.seen.contains_id("github_9"));
}

#[tokio::test]
async fn corrupt_ledger_is_rebuilt_from_feed_ids_and_threads() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let reply = NormalizedItem::new(Source::Twitter, "77", "ferris", "reply".into(), base)
        .with_meta(CONVERSATION_ID_KEY, "c1");
    let mut seen = SeenState::new();
    store.save(&[reply, item(1)], &mut seen).await.unwrap();

    std::fs::write(store.seen_path(), b"{\"ids\": [").unwrap();

    let loaded = store.load().await;
    assert_eq!(loaded.seen_status, LoadStatus::Corrupt);
    assert!(loaded.seen.contains_id("twitter_77"));
    assert!(loaded.seen.contains_id("github_1"));
    assert!(loaded.seen.contains_conversation("c1"));
    assert_eq!(loaded.seen.conversations(), ["c1"]);
}

#[tokio::test]
async fn load_collapses_duplicates_and_resorts() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    std::fs::create_dir_all(dir.path().join("data")).unwrap();

    let mut dup = item(2);
    dup.content = "second copy".into();
    let hand_edited = vec![item(1), item(2), dup, item(3)];
    std::fs::write(store.feed_path(), serde_json::to_vec(&hand_edited).unwrap()).unwrap();

    let loaded = store.load().await;
    let ids: Vec<&str> = loaded.feed.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["github_3", "github_2", "github_1"]);
    assert_eq!(loaded.feed[1].content, "issue 2", "first occurrence wins");
}

#[tokio::test]
async fn ledger_trim_never_drops_ids_still_in_feed() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir).with_caps(5, 5);

    // oldest ledger entries are exactly the ones still shown
    let feed: Vec<_> = (0..3).rev().map(item).collect();
    let mut seen = SeenState::new();
    for it in feed.iter().rev() {
        seen.insert_id(it.id.clone());
    }
    for n in 100..110 {
        seen.insert_id(format!("github_{n}"));
    }

    store.save(&feed, &mut seen).await.unwrap();
    let loaded = store.load().await;

    for it in &feed {
        assert!(loaded.seen.contains_id(&it.id), "{} trimmed while in feed", it.id);
    }
    assert!(loaded.seen.contains_id("github_109"));
    assert!(!loaded.seen.contains_id("github_100"));
    assert!(loaded.seen.id_count() <= 5 + feed.len());
}

#[tokio::test]
async fn failed_save_leaves_previous_artifact() {
    let dir = TempDir::new().unwrap();
    let good = store_in(&dir);
    let mut seen = SeenState::new();
    good.save(&[item(1)], &mut seen).await.unwrap();

    // seen path is a directory, so the second write must fail
    let blocked = dir.path().join("blocked");
    std::fs::create_dir_all(&blocked).unwrap();
    let bad = FeedStore::new(good.feed_path(), &blocked);
    let err = bad.save(&[item(2), item(1)], &mut seen).await;
    assert!(err.is_err());

    // the feed write that did succeed is whole, never partial
    let loaded = good.load().await;
    assert_eq!(loaded.feed_status, LoadStatus::Loaded);
    assert!(!loaded.feed.is_empty());
}
