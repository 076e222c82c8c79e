// tests/scheduler_gate.rs
//
// Single-flight and cool-down behaviour of the scheduler with a real cycle
// held open by a gated source, plus the timed loop on a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::Notify;

use social_feed::config::ScheduleCfg;
use social_feed::ingest::types::SourceProvider;
use social_feed::model::{NormalizedItem, Source};
use social_feed::pipeline::FeedPipeline;
use social_feed::scheduler::{Scheduler, TriggerKind, TriggerRejection};
use social_feed::store::FeedStore;

/// Blocks every fetch until released.
struct Gated {
    release: Arc<Notify>,
}

#[async_trait::async_trait]
impl SourceProvider for Gated {
    async fn fetch_latest(&self) -> Result<Vec<NormalizedItem>> {
        self.release.notified().await;
        Ok(vec![NormalizedItem::new(
            Source::Reddit,
            "1",
            "alice",
            "hello".into(),
            Utc::now(),
        )])
    }
    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Counts fetches; optionally holds each one until released.
struct Counting {
    calls: Arc<AtomicUsize>,
    hold: Option<Arc<Notify>>,
}

#[async_trait::async_trait]
impl SourceProvider for Counting {
    async fn fetch_latest(&self) -> Result<Vec<NormalizedItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        Ok(Vec::new())
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

const PERIOD: Duration = Duration::from_secs(60);

fn ticking(dir: &TempDir, calls: Arc<AtomicUsize>, hold: Option<Arc<Notify>>) -> Arc<Scheduler> {
    let store = FeedStore::new(dir.path().join("feed.json"), dir.path().join("seen.json"));
    let counting: Arc<dyn SourceProvider> = Arc::new(Counting { calls, hold });
    let cfg = ScheduleCfg {
        interval_secs: PERIOD.as_secs(),
        manual_cooldown_secs: 0,
        run_on_start: false,
    };
    Scheduler::new(Arc::new(FeedPipeline::new(store, vec![counting])), &cfg)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn scheduler(dir: &TempDir, release: Arc<Notify>) -> Arc<Scheduler> {
    let store = FeedStore::new(dir.path().join("feed.json"), dir.path().join("seen.json"));
    let gated: Arc<dyn SourceProvider> = Arc::new(Gated { release });
    let pipeline = FeedPipeline::new(store, vec![gated]);
    let cfg = ScheduleCfg {
        interval_secs: 3600,
        manual_cooldown_secs: 30,
        run_on_start: false,
    };
    Scheduler::new(Arc::new(pipeline), &cfg)
}

#[tokio::test]
async fn second_trigger_while_running_is_busy() {
    let dir = TempDir::new().unwrap();
    let release = Arc::new(Notify::new());
    let sched = scheduler(&dir, release.clone());

    let running = sched.trigger(TriggerKind::Manual).expect("first trigger accepted");
    assert!(sched.status().running);

    assert_eq!(
        sched.trigger(TriggerKind::Manual).err(),
        Some(TriggerRejection::Busy)
    );
    assert_eq!(
        sched.trigger(TriggerKind::Scheduled).err(),
        Some(TriggerRejection::Busy)
    );

    release.notify_one();
    running.await.unwrap();

    let status = sched.status();
    assert!(!status.running);
    let last = status.last.expect("cycle recorded");
    assert!(last.ok);
    assert_eq!(last.trigger, TriggerKind::Manual);
    assert_eq!(last.report.unwrap().admitted, 1);
}

#[tokio::test]
async fn manual_after_manual_is_throttled_but_scheduled_is_not() {
    let dir = TempDir::new().unwrap();
    let release = Arc::new(Notify::new());
    let sched = scheduler(&dir, release.clone());

    release.notify_one();
    let report = sched.run_now(TriggerKind::Manual).await.unwrap();
    assert!(report.is_some());

    match sched.trigger(TriggerKind::Manual) {
        Err(TriggerRejection::Throttled { retry_after_secs }) => {
            assert!((1..=30).contains(&retry_after_secs), "{retry_after_secs}")
        }
        other => panic!("expected throttled, got {:?}", other.map(|_| ())),
    }

    release.notify_one();
    let scheduled = sched.run_now(TriggerKind::Scheduled).await.unwrap();
    assert_eq!(scheduled.map(|r| r.admitted), Some(0));
}

#[tokio::test]
async fn failed_cycle_releases_gate() {
    let dir = TempDir::new().unwrap();
    // feed path is a directory, so persistence fails
    std::fs::create_dir_all(dir.path().join("feed.json")).unwrap();
    let release = Arc::new(Notify::new());
    let sched = scheduler(&dir, release.clone());

    release.notify_one();
    let out = sched.run_now(TriggerKind::Scheduled).await.unwrap();
    assert!(out.is_none());

    let status = sched.status();
    assert!(!status.running);
    let last = status.last.unwrap();
    assert!(!last.ok);
    assert!(last.error.unwrap().contains("persisting feed state"));

    release.notify_one();
    assert!(sched.run_now(TriggerKind::Scheduled).await.is_ok());
}

#[tokio::test]
async fn abandoned_run_now_keeps_gate_until_cycle_ends() {
    let dir = TempDir::new().unwrap();
    let release = Arc::new(Notify::new());
    let sched = scheduler(&dir, release.clone());

    let waited = tokio::time::timeout(
        Duration::from_millis(50),
        sched.run_now(TriggerKind::Scheduled),
    )
    .await;
    assert!(waited.is_err(), "cycle should still be blocked");

    assert!(sched.status().running);
    assert_eq!(
        sched.trigger(TriggerKind::Scheduled).err(),
        Some(TriggerRejection::Busy)
    );
    assert_eq!(
        sched.trigger(TriggerKind::Manual).err(),
        Some(TriggerRejection::Busy)
    );

    release.notify_one();
    wait_until(|| !sched.status().running).await;
    let last = sched.status().last.expect("abandoned cycle still recorded");
    assert!(last.ok);
    assert_eq!(last.trigger, TriggerKind::Scheduled);
    assert_eq!(last.report.map(|r| r.admitted), Some(1));
}

#[tokio::test(start_paused = true)]
async fn run_on_start_fires_at_once_then_every_period() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let sched = ticking(&dir, calls.clone(), None);

    let ticker = sched.spawn(true);
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
    wait_until(|| !sched.status().running).await;

    tokio::time::advance(PERIOD / 2).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "fired before the period elapsed");

    tokio::time::advance(PERIOD / 2).await;
    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
    wait_until(|| !sched.status().running).await;

    tokio::time::advance(PERIOD).await;
    wait_until(|| calls.load(Ordering::SeqCst) == 3).await;
    ticker.abort();
}

#[tokio::test(start_paused = true)]
async fn without_run_on_start_first_cycle_waits_one_period() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let sched = ticking(&dir, calls.clone(), None);

    let ticker = sched.spawn(false);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(sched.status().last.is_none());

    tokio::time::advance(PERIOD).await;
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
    wait_until(|| !sched.status().running).await;
    assert_eq!(
        sched.status().last.map(|l| l.trigger),
        Some(TriggerKind::Scheduled)
    );
    ticker.abort();
}

#[tokio::test(start_paused = true)]
async fn ticks_during_a_busy_cycle_are_dropped_not_queued() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let hold = Arc::new(Notify::new());
    let sched = ticking(&dir, calls.clone(), Some(hold.clone()));

    let ticker = sched.spawn(true);
    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;

    for _ in 0..3 {
        tokio::time::advance(PERIOD).await;
        settle().await;
        assert!(sched.status().running);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "overlapping cycle started");
    }

    hold.notify_one();
    wait_until(|| !sched.status().running).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "missed ticks replayed after release");

    tokio::time::advance(PERIOD).await;
    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
    ticker.abort();
}
