//! Cycle triggering: periodic timer plus throttled manual refresh.
//!
//! At most one cycle runs at a time. Both trigger kinds go through the same
//! [`CycleGate`]; a trigger that finds a cycle in flight is rejected, never
//! queued.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ScheduleCfg;
use crate::metrics as feed_metrics;
use crate::pipeline::{CycleReport, FeedPipeline};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerRejection {
    #[error("a cycle is already running")]
    Busy,
    #[error("manual refresh throttled, retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },
}

impl TriggerRejection {
    fn label(&self) -> &'static str {
        match self {
            TriggerRejection::Busy => "busy",
            TriggerRejection::Throttled { .. } => "throttled",
        }
    }
}

/// Single-flight gate with a manual-trigger cool-down.
///
/// The cool-down runs from the start of the last *accepted* manual trigger.
/// Scheduled triggers ignore it and do not reset it.
pub struct CycleGate {
    state: AtomicU8,
    last_manual: Mutex<Option<DateTime<Utc>>>,
    cooldown: chrono::Duration,
}

impl CycleGate {
    pub fn new(cooldown_secs: u64) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(IDLE),
            last_manual: Mutex::new(None),
            cooldown: chrono::Duration::seconds(cooldown_secs.min(i64::MAX as u64) as i64),
        })
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Claim the gate. Busy wins over throttled: a manual trigger during a
    /// running cycle is reported as busy whatever the cool-down says. A
    /// throttled trigger never touches the running state.
    pub fn try_start(
        self: &Arc<Self>,
        kind: TriggerKind,
        now: DateTime<Utc>,
    ) -> Result<CycleGuard, TriggerRejection> {
        if self.is_running() {
            return Err(TriggerRejection::Busy);
        }

        // held across the swap so two manual triggers cannot both pass the check
        let mut last_manual = match kind {
            TriggerKind::Manual => {
                let last = self.last_manual.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(retry_after_secs) = self.cooldown_remaining(*last, now) {
                    return Err(TriggerRejection::Throttled { retry_after_secs });
                }
                Some(last)
            }
            TriggerKind::Scheduled => None,
        };

        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TriggerRejection::Busy);
        }
        if let Some(last) = last_manual.as_mut() {
            **last = Some(now);
        }
        Ok(CycleGuard {
            gate: Arc::clone(self),
        })
    }

    fn cooldown_remaining(&self, prev: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<u64> {
        let elapsed = now - prev?;
        if elapsed >= self.cooldown {
            return None;
        }
        let remaining_ms = (self.cooldown - elapsed).num_milliseconds().max(0) as u64;
        Some(remaining_ms.div_ceil(1000).max(1))
    }
}

/// Holds the gate in the running state; releases it on drop, including
/// when a cycle task unwinds.
pub struct CycleGuard {
    gate: Arc<CycleGate>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.gate.state.store(IDLE, Ordering::Release);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LastCycle {
    pub trigger: TriggerKind,
    pub finished_at: DateTime<Utc>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CycleReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub manual_cooldown_secs: u64,
    pub last: Option<LastCycle>,
}

pub struct Scheduler {
    pipeline: Arc<FeedPipeline>,
    gate: Arc<CycleGate>,
    interval: Duration,
    cooldown_secs: u64,
    last: RwLock<Option<LastCycle>>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<FeedPipeline>, cfg: &ScheduleCfg) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            gate: CycleGate::new(cfg.manual_cooldown_secs),
            interval: Duration::from_secs(cfg.interval_secs.max(1)),
            cooldown_secs: cfg.manual_cooldown_secs,
            last: RwLock::new(None),
        })
    }

    pub fn pipeline(&self) -> &FeedPipeline {
        &self.pipeline
    }

    /// Claim the gate and run a cycle in the background. The spawned task
    /// owns the gate until the cycle has finished and been recorded.
    pub fn trigger(
        self: &Arc<Self>,
        kind: TriggerKind,
    ) -> Result<JoinHandle<Option<CycleReport>>, TriggerRejection> {
        let guard = self.claim(kind)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run_guarded(kind, guard).await }))
    }

    /// Claim the gate and wait for the cycle. Dropping the returned future
    /// does not stop the cycle or release the gate early.
    pub async fn run_now(
        self: &Arc<Self>,
        kind: TriggerKind,
    ) -> Result<Option<CycleReport>, TriggerRejection> {
        let handle = self.trigger(kind)?;
        match handle.await {
            Ok(report) => Ok(report),
            Err(join) => {
                tracing::error!(target: "scheduler", trigger = kind.as_str(), "cycle runner aborted: {join}");
                Ok(None)
            }
        }
    }

    fn claim(&self, kind: TriggerKind) -> Result<CycleGuard, TriggerRejection> {
        self.gate.try_start(kind, Utc::now()).inspect_err(|rej| {
            feed_metrics::trigger_rejected(rej.label());
            tracing::debug!(target: "scheduler", trigger = kind.as_str(), "trigger rejected: {rej}");
        })
    }

    /// The cycle runs on its own task so a panic is contained and reported
    /// instead of taking the scheduler down. The guard is released only
    /// after the outcome is recorded.
    async fn run_guarded(&self, kind: TriggerKind, guard: CycleGuard) -> Option<CycleReport> {
        let pipeline = Arc::clone(&self.pipeline);
        let joined = tokio::spawn(async move { pipeline.run_cycle().await }).await;

        let (report, error) = match joined {
            Ok(Ok(report)) => (Some(report), None),
            Ok(Err(e)) => {
                tracing::error!(target: "scheduler", trigger = kind.as_str(), "cycle failed: {e:#}");
                (None, Some(format!("{e:#}")))
            }
            Err(join) => {
                feed_metrics::cycle_failed();
                tracing::error!(target: "scheduler", trigger = kind.as_str(), "cycle task aborted: {join}");
                (None, Some(join.to_string()))
            }
        };

        let entry = LastCycle {
            trigger: kind,
            finished_at: Utc::now(),
            ok: error.is_none(),
            error,
            report: report.clone(),
        };
        *self.last.write().unwrap_or_else(|p| p.into_inner()) = Some(entry);
        drop(guard);
        report
    }

    /// Start the periodic loop. With `run_on_start` the first cycle fires
    /// immediately, otherwise after one full interval.
    pub fn spawn(self: &Arc<Self>, run_on_start: bool) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            if !run_on_start {
                ticker.tick().await;
            }
            tracing::info!(
                target: "scheduler",
                interval_secs = this.interval.as_secs(),
                run_on_start,
                "scheduler started"
            );
            loop {
                ticker.tick().await;
                // rejected ticks are dropped; the next tick tries again
                let _ = this.trigger(TriggerKind::Scheduled);
            }
        })
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.gate.is_running(),
            interval_secs: self.interval.as_secs(),
            manual_cooldown_secs: self.cooldown_secs,
            last: self.last.read().unwrap_or_else(|p| p.into_inner()).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn manual_cooldown_reports_remaining_seconds() {
        let gate = CycleGate::new(30);
        drop(gate.try_start(TriggerKind::Manual, t(0)).unwrap());
        let rej = gate.try_start(TriggerKind::Manual, t(5)).err().unwrap();
        assert_eq!(rej, TriggerRejection::Throttled { retry_after_secs: 25 });
        assert!(!gate.is_running(), "throttled trigger must release the gate");
        assert!(gate.try_start(TriggerKind::Manual, t(30)).is_ok());
    }

    #[test]
    fn busy_beats_throttled() {
        let gate = CycleGate::new(30);
        let _running = gate.try_start(TriggerKind::Manual, t(0)).unwrap();
        assert_eq!(
            gate.try_start(TriggerKind::Manual, t(1)).err(),
            Some(TriggerRejection::Busy)
        );
        assert_eq!(
            gate.try_start(TriggerKind::Scheduled, t(1)).err(),
            Some(TriggerRejection::Busy)
        );
    }

    #[test]
    fn scheduled_ignores_and_keeps_cooldown() {
        let gate = CycleGate::new(30);
        drop(gate.try_start(TriggerKind::Manual, t(0)).unwrap());
        drop(gate.try_start(TriggerKind::Scheduled, t(2)).unwrap());
        let rej = gate.try_start(TriggerKind::Manual, t(10)).err().unwrap();
        assert_eq!(rej, TriggerRejection::Throttled { retry_after_secs: 20 });
    }

    #[test]
    fn throttled_manual_never_blocks_a_scheduled_start() {
        let gate = CycleGate::new(3600);
        drop(gate.try_start(TriggerKind::Manual, t(0)).unwrap());

        std::thread::scope(|s| {
            for _ in 0..4 {
                let gate = &gate;
                s.spawn(move || {
                    for _ in 0..2000 {
                        assert!(matches!(
                            gate.try_start(TriggerKind::Manual, t(1)),
                            Err(TriggerRejection::Throttled { .. })
                        ));
                    }
                });
            }
            for _ in 0..2000 {
                let started = gate.try_start(TriggerKind::Scheduled, t(1));
                assert!(started.is_ok(), "scheduled start rejected: {:?}", started.err());
            }
        });
        assert_eq!(gate.state.load(Ordering::Acquire), IDLE);
    }

    #[test]
    fn sub_second_remainder_rounds_up() {
        let gate = CycleGate::new(30);
        drop(gate.try_start(TriggerKind::Manual, t(0)).unwrap());
        let now = t(29) + chrono::Duration::milliseconds(600);
        let rej = gate.try_start(TriggerKind::Manual, now).err().unwrap();
        assert_eq!(rej, TriggerRejection::Throttled { retry_after_secs: 1 });
    }
}
