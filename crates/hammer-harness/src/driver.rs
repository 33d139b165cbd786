//! # Stress Driver
//!
//! Background load generator: one purchase at a time, back to back, with a
//! random pause in between.
//!
//! ## Run Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Stress Run                                     │
//! │                                                                         │
//! │   start(gap) ──► reset stats, phase = Running, spawn loop               │
//! │                                                                         │
//! │   ┌──────────────────────────────────────────────────────────────┐      │
//! │   │ while Running:                                               │      │
//! │   │   1. request id, attempts += 1, initiate purchase            │      │
//! │   │      └─ refused ─► record Rejected, go to 4                  │      │
//! │   │   2. wait for that request's finished flow                   │      │
//! │   │      └─ timeout ─► record Unknown, cancel, ack, end run      │      │
//! │   │   3. record outcome, ack back to Idle                        │      │
//! │   │   4. if still Running: sleep uniform [min_gap, max_gap]      │      │
//! │   │      (stop() wakes the sleep early)                          │      │
//! │   └──────────────────────────────────────────────────────────────┘      │
//! │                                                                         │
//! │   stop() ──► phase = Stopping; the loop notices at step 4 or 1          │
//! │   loop exit ──► finalize stats + phase = Idle under one lock            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the loop task ever initiates a purchase, and it waits for the
//! previous one to finish and be acknowledged first, so at most one
//! driver transaction is in flight.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use hammer_core::{request_id, GapRange, OutcomeKind, SessionState, TransactionFlowState};

use crate::completion::{wait_for_completion, CompletionSignal, WaitPolicy};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::sdk::TerminalSdk;
use crate::telemetry::{clock, RunPhase, SharedTelemetry};

// =============================================================================
// Settings & Status
// =============================================================================

/// Per-session driver settings.
#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub amount_cents: i64,
    pub wait: WaitPolicy,
    /// Seed for gap sampling (random if unset).
    pub seed: Option<u64>,
}

impl DriverSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        DriverSettings {
            amount_cents: config.hammer.amount_cents,
            wait: WaitPolicy {
                recheck: config.completion_recheck(),
                timeout: config.completion_timeout(),
            },
            seed: config.hammer.seed,
        }
    }
}

/// What the console shows about the driver.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriverStatus {
    pub phase: RunPhase,
    /// Gap of the current (or last) run.
    pub gap: Option<GapRange>,
    /// Purchase cycles finished in the current (or last) run.
    pub cycles: u64,
    pub last_error: Option<String>,
    /// The run ended with a transaction whose outcome only the terminal knows.
    pub check_terminal: bool,
    pub completed_runs: u64,
}

// =============================================================================
// Driver
// =============================================================================

struct DriverInner {
    sdk: Arc<dyn TerminalSdk>,
    state: Arc<RwLock<SessionState>>,
    telemetry: SharedTelemetry,
    completion: CompletionSignal,
    settings: DriverSettings,
    /// Only modified while the telemetry lock is held, so it never
    /// disagrees with `Telemetry::phase`.
    status: watch::Sender<DriverStatus>,
    /// Wakes the gap sleep of the current run.
    wake: StdMutex<Arc<Notify>>,
}

/// The stress driver. Cheap to clone; clones share one run.
#[derive(Clone)]
pub struct StressDriver {
    inner: Arc<DriverInner>,
}

impl StressDriver {
    pub fn new(
        sdk: Arc<dyn TerminalSdk>,
        state: Arc<RwLock<SessionState>>,
        telemetry: SharedTelemetry,
        completion: CompletionSignal,
        settings: DriverSettings,
    ) -> Self {
        let (status, _) = watch::channel(DriverStatus::default());
        StressDriver {
            inner: Arc::new(DriverInner {
                sdk,
                state,
                telemetry,
                completion,
                settings,
                status,
                wake: StdMutex::new(Arc::new(Notify::new())),
            }),
        }
    }

    /// Starts a run with `gap`. Returns false (and does nothing) if a run is
    /// already active.
    pub async fn start(&self, gap: GapRange) -> bool {
        let wake = Arc::new(Notify::new());
        {
            let mut telemetry = self.inner.telemetry.lock().await;
            if telemetry.phase.is_active() {
                info!(phase = %telemetry.phase, "Hammer already active, ignoring start");
                return false;
            }
            telemetry
                .stats
                .reset(self.inner.sdk.current_status(), clock::now(), clock::wall());
            telemetry.phase = RunPhase::Running;

            self.inner.status.send_modify(|status| {
                status.phase = RunPhase::Running;
                status.gap = Some(gap);
                status.cycles = 0;
                status.last_error = None;
                status.check_terminal = false;
            });
            *self.inner.wake_slot() = wake.clone();
        }

        tokio::spawn(DriverInner::run_loop(self.inner.clone(), gap, wake));

        info!(
            min_gap_ms = gap.min_ms(),
            max_gap_ms = gap.max_ms(),
            fixed_gap = gap.is_fixed(),
            amount_cents = self.inner.settings.amount_cents,
            "Hammering started"
        );
        true
    }

    /// Asks the active run to stop after its current transaction. Returns
    /// false if no run was running.
    pub async fn stop(&self) -> bool {
        {
            let mut telemetry = self.inner.telemetry.lock().await;
            if telemetry.phase != RunPhase::Running {
                debug!(phase = %telemetry.phase, "Hammer not running, ignoring stop");
                return false;
            }
            telemetry.phase = RunPhase::Stopping;
            self.inner.status.send_modify(|status| status.phase = RunPhase::Stopping);
        }

        self.inner.wake_slot().notify_one();
        info!("Hammering stopping");
        true
    }

    /// Waits until no run is active.
    pub async fn wait_idle(&self) {
        let mut status = self.inner.status.subscribe();
        if status.wait_for(|s| !s.phase.is_active()).await.is_err() {
            warn!("Driver status channel closed while waiting for idle");
        }
    }

    /// Status updates, one per phase change and finished cycle.
    pub fn subscribe(&self) -> watch::Receiver<DriverStatus> {
        self.inner.status.subscribe()
    }

    pub async fn phase(&self) -> RunPhase {
        self.inner.telemetry.lock().await.phase
    }

    pub fn status(&self) -> DriverStatus {
        self.inner.status.borrow().clone()
    }
}

impl DriverInner {
    fn wake_slot(&self) -> MutexGuard<'_, Arc<Notify>> {
        self.wake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn is_running(&self) -> bool {
        self.telemetry.lock().await.phase == RunPhase::Running
    }

    async fn run_loop(inner: Arc<DriverInner>, gap: GapRange, wake: Arc<Notify>) {
        let mut rng = match inner.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut completions = inner.completion.subscribe();
        let mut failure: Option<HarnessError> = None;

        loop {
            if !inner.is_running().await {
                break;
            }

            if let Err(e) = inner.run_once(&mut completions).await {
                error!(error = %e, "Hammer run aborted");
                failure = Some(e);
                break;
            }
            inner.finish_cycle().await;

            if !inner.is_running().await {
                break;
            }

            let pause = Duration::from_millis(rng.gen_range(gap.min_ms()..=gap.max_ms()));
            debug!(pause_ms = pause.as_millis() as u64, "Sleeping before next purchase");
            tokio::select! {
                _ = sleep(pause) => {}
                _ = wake.notified() => {
                    debug!("Gap sleep interrupted");
                }
            }
        }

        let snapshot = {
            let mut telemetry = inner.telemetry.lock().await;
            telemetry.stats.finalize(clock::now(), clock::wall());
            telemetry.phase = RunPhase::Idle;
            inner.status.send_modify(|status| {
                status.phase = RunPhase::Idle;
                status.completed_runs += 1;
                status.last_error = failure.as_ref().map(|e| e.to_string());
                status.check_terminal = failure.as_ref().is_some_and(HarnessError::needs_terminal_check);
            });
            telemetry.stats.snapshot()
        };

        info!(
            attempts = snapshot.attempts,
            disconnects = snapshot.disconnects,
            reconnects = snapshot.reconnects,
            "Hammering stopped"
        );
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(stats = %json, "Final hammer statistics"),
            Err(e) => warn!("Could not serialize hammer statistics: {}", e),
        }
    }

    async fn finish_cycle(&self) {
        let snapshot = {
            let telemetry = self.telemetry.lock().await;
            self.status.send_modify(|status| status.cycles += 1);
            telemetry.stats.snapshot()
        };
        info!(
            attempts = snapshot.attempts,
            successes = snapshot.count(OutcomeKind::Success),
            failures = snapshot.count(OutcomeKind::Failed),
            unknowns = snapshot.count(OutcomeKind::Unknown),
            rejected = snapshot.count(OutcomeKind::Rejected),
            disconnects = snapshot.disconnects,
            "Hammer cycle finished"
        );
    }

    /// One purchase cycle.
    async fn run_once(
        &self,
        completions: &mut watch::Receiver<Option<TransactionFlowState>>,
    ) -> HarnessResult<()> {
        let id = request_id("prchs");
        self.telemetry.lock().await.stats.record_attempt();

        let result = self.sdk.initiate_purchase(&id, self.settings.amount_cents);
        if !result.initiated {
            warn!(request_id = %id, message = %result.message, "Purchase not initiated");
            self.telemetry.lock().await.stats.record_outcome(OutcomeKind::Rejected);
            return Ok(());
        }
        debug!(request_id = %id, "Purchase initiated");

        match wait_for_completion(completions, &self.sdk, &id, self.settings.wait).await {
            Ok(finished) => {
                let outcome = OutcomeKind::from(finished.success);
                self.telemetry.lock().await.stats.record_outcome(outcome);
                info!(request_id = %id, outcome = %outcome, "Purchase finished");
                self.acknowledge(&id).await;
                Ok(())
            }
            Err(e @ HarnessError::StalledTransaction { .. }) => {
                self.telemetry.lock().await.stats.record_outcome(OutcomeKind::Unknown);
                warn!(request_id = %id, "Cancelling stalled purchase");
                self.sdk.cancel_transaction();
                self.acknowledge(&id).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn acknowledge(&self, id: &str) {
        if !self.sdk.ack_flow_ended_and_back_to_idle() {
            warn!(request_id = %id, "Terminal did not return to idle");
        }
        self.state.write().await.apply_flow(self.sdk.current_flow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorSettings;
    use crate::projector::{EventProjector, NoOpEmitter, ProjectorHandle};
    use crate::simulator::SimulatedTerminal;
    use crate::telemetry;
    use hammer_core::{Secrets, SpiFlow, SuccessState};

    struct Rig {
        sim: SimulatedTerminal,
        driver: StressDriver,
        telemetry: SharedTelemetry,
        projector: ProjectorHandle,
    }

    async fn rig(timeout_secs: Option<u64>) -> Rig {
        let (sim, events) = SimulatedTerminal::new(
            SimulatorSettings {
                connect_latency_ms: 10,
                tx_latency_ms: 500,
                seed: Some(1),
                ..Default::default()
            },
            "POS1",
            "10.0.0.5",
            Some(Secrets::new("E", "H")),
        );
        let sdk: Arc<dyn TerminalSdk> = Arc::new(sim.clone());
        let state = Arc::new(RwLock::new(SessionState::new("POS1", "10.0.0.5")));
        let telemetry = telemetry::shared();
        let completion = CompletionSignal::new();

        let projector = EventProjector::new(
            sdk.clone(),
            state.clone(),
            telemetry.clone(),
            completion.clone(),
            Arc::new(NoOpEmitter),
        )
        .spawn(events);

        sim.start();
        sleep(Duration::from_millis(50)).await;

        let driver = StressDriver::new(
            sdk,
            state,
            telemetry.clone(),
            completion,
            DriverSettings {
                amount_cents: 1000,
                wait: WaitPolicy {
                    recheck: Duration::from_secs(1),
                    timeout: timeout_secs.map(Duration::from_secs),
                },
                seed: Some(3),
            },
        );

        Rig {
            sim,
            driver,
            telemetry,
            projector,
        }
    }

    fn fixed_gap() -> GapRange {
        GapRange::new(1000, 1000).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_run_counts_every_outcome() {
        let rig = rig(Some(60)).await;
        rig.sim.script_outcomes([
            SuccessState::Success,
            SuccessState::Success,
            SuccessState::Failed,
        ]);

        assert!(rig.driver.start(fixed_gap()).await);
        // Purchases finish at 0.5s, 2.0s and 3.5s; the third gap runs to 4.5s.
        sleep(Duration::from_millis(3700)).await;
        assert!(rig.driver.stop().await);
        rig.driver.wait_idle().await;

        let snap = rig.telemetry.lock().await.stats.snapshot();
        assert_eq!(snap.attempts, 3);
        assert_eq!(snap.count(OutcomeKind::Success), 2);
        assert_eq!(snap.count(OutcomeKind::Failed), 1);
        assert_eq!(snap.outcomes_total(), snap.attempts);
        assert!(!snap.measuring);

        // Single flight: the terminal never saw an overlapping request.
        assert_eq!(rig.sim.busy_rejections(), 0);
        assert_eq!(rig.sim.initiated_count(), 3);
        assert_eq!(rig.driver.phase().await, RunPhase::Idle);
        assert_eq!(rig.sim.current_flow(), SpiFlow::Idle);

        rig.projector.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_counted_and_run_continues() {
        let rig = rig(Some(60)).await;
        rig.sim.reject_next(1);
        rig.sim.script_outcomes([SuccessState::Success, SuccessState::Success]);

        assert!(rig.driver.start(fixed_gap()).await);
        // Rejected at 0s, second purchase at 1.0s finishes at 1.5s.
        sleep(Duration::from_millis(2200)).await;
        rig.driver.stop().await;
        rig.driver.wait_idle().await;

        let snap = rig.telemetry.lock().await.stats.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.count(OutcomeKind::Rejected), 1);
        assert_eq!(snap.count(OutcomeKind::Success), 1);
        assert_eq!(rig.driver.status().last_error, None);
        assert!(!rig.driver.status().check_terminal);
        assert_eq!(rig.driver.status().cycles, 2);

        rig.projector.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let rig = rig(Some(60)).await;

        assert!(!rig.driver.stop().await);
        assert!(rig.driver.start(fixed_gap()).await);
        assert!(!rig.driver.start(fixed_gap()).await);

        assert!(rig.driver.stop().await);
        assert!(!rig.driver.stop().await);
        rig.driver.wait_idle().await;
        assert!(!rig.driver.stop().await);

        let status = rig.driver.status();
        assert_eq!(status.phase, RunPhase::Idle);
        assert_eq!(status.completed_runs, 1);

        // A new run may start once the previous one drained.
        assert!(rig.driver.start(fixed_gap()).await);
        rig.driver.stop().await;
        rig.driver.wait_idle().await;
        assert_eq!(rig.driver.status().completed_runs, 2);

        rig.projector.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_keeps_counters() {
        let rig = rig(Some(60)).await;
        rig.sim.script_outcomes([SuccessState::Success, SuccessState::Failed]);

        assert!(rig.driver.start(fixed_gap()).await);
        // First purchase finishes at 0.5s; the gap runs until 1.5s.
        sleep(Duration::from_millis(800)).await;
        let before = rig.telemetry.lock().await.stats.snapshot();
        assert_eq!(before.attempts, 1);
        assert_eq!(before.count(OutcomeKind::Success), 1);
        assert_eq!(rig.driver.status().cycles, 1);

        assert!(!rig.driver.start(fixed_gap()).await);

        let after = rig.telemetry.lock().await.stats.snapshot();
        assert_eq!(after.attempts, before.attempts);
        assert_eq!(after.outcome_counts, before.outcome_counts);
        assert_eq!(after.started_at, before.started_at);
        assert!(after.measuring);
        assert_eq!(rig.driver.status().cycles, 1);

        rig.driver.stop().await;
        rig.driver.wait_idle().await;
        rig.projector.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_plus_disconnected_equals_elapsed() {
        let rig = rig(Some(60)).await;

        assert!(rig.driver.start(fixed_gap()).await);
        sleep(Duration::from_millis(1200)).await;
        rig.sim.drop_link();
        sleep(Duration::from_millis(2600)).await;
        rig.driver.stop().await;
        rig.driver.wait_idle().await;

        let snap = rig.telemetry.lock().await.stats.snapshot();
        assert_eq!(snap.disconnects, 1);
        assert_eq!(snap.reconnects, 1);
        assert_eq!(snap.disconnected, Duration::from_millis(10));
        assert_eq!(snap.connected + snap.disconnected, snap.elapsed.unwrap());

        rig.projector.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_purchase_ends_the_run() {
        let rig = rig(Some(5)).await;
        rig.sim.stall_next(1);

        assert!(rig.driver.start(fixed_gap()).await);
        rig.driver.wait_idle().await;

        let snap = rig.telemetry.lock().await.stats.snapshot();
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.count(OutcomeKind::Unknown), 1);
        assert!(!snap.measuring);

        let status = rig.driver.status();
        assert_eq!(status.phase, RunPhase::Idle);
        assert!(status.check_terminal);
        assert!(status.last_error.unwrap().contains("did not finish within 5s"));
        assert_eq!(rig.sim.current_flow(), SpiFlow::Idle);

        rig.projector.shutdown().await.unwrap();
    }
}
