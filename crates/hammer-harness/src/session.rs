//! # Terminal Session
//!
//! The explicitly constructed context a console talks to. It owns the SDK
//! handle, the mirrored session state, the shared telemetry, the event
//! projector task and the stress driver.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Session::start ──► spawn projector over the SDK event channel         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   operator commands (pair, hammer, pizza, ok, ...)                      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   Session::shutdown                                                     │
//! │        1. stop any active run                                           │
//! │        2. wait for the run loop to reach Idle                           │
//! │        3. stop the projector                                            │
//! │        4. hand back the persisted line (if paired)                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use hammer_core::validation::{parse_gap_secs, validate_pos_id, validate_terminal_address};
use hammer_core::{
    request_id, GapRange, PairingFlowState, PersistedSession, SessionState, SpiFlow, SpiStatus,
    StatsSnapshot, TransactionFlowState, TransactionType,
};

use crate::completion::CompletionSignal;
use crate::config::HarnessConfig;
use crate::driver::{DriverSettings, DriverStatus, StressDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::projector::{EventProjector, ProjectionEmitter, ProjectorHandle};
use crate::sdk::{SpiEventReceiver, TerminalSdk};
use crate::simulator::SimulatedTerminal;
use crate::telemetry::{self, clock, SharedTelemetry};

/// Everything the console renders, copied out in one go.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub status: SpiStatus,
    pub flow: SpiFlow,
    pub pairing: PairingFlowState,
    pub tx: TransactionFlowState,
    pub stats: StatsSnapshot,
    pub driver: DriverStatus,
    pub gap: GapRange,
    pub amount_cents: i64,
}

/// A live terminal session.
pub struct Session {
    sdk: Arc<dyn TerminalSdk>,
    state: Arc<RwLock<SessionState>>,
    telemetry: SharedTelemetry,
    driver: StressDriver,
    projector: ProjectorHandle,
    gap: RwLock<GapRange>,
    amount_cents: i64,
}

impl Session {
    /// Starts a session over `sdk`, whose notifications arrive on `events`.
    pub fn start(
        sdk: Arc<dyn TerminalSdk>,
        events: SpiEventReceiver,
        state: SessionState,
        config: &HarnessConfig,
        emitter: Arc<dyn ProjectionEmitter>,
    ) -> HarnessResult<Self> {
        let gap = config.gap()?;
        let state = Arc::new(RwLock::new(state));
        let telemetry = telemetry::shared();
        let completion = CompletionSignal::new();

        let projector = EventProjector::new(
            sdk.clone(),
            state.clone(),
            telemetry.clone(),
            completion.clone(),
            emitter,
        )
        .spawn(events);

        let driver = StressDriver::new(
            sdk.clone(),
            state.clone(),
            telemetry.clone(),
            completion,
            DriverSettings::from_config(config),
        );

        Ok(Session {
            sdk,
            state,
            telemetry,
            driver,
            projector,
            gap: RwLock::new(gap),
            amount_cents: config.hammer.amount_cents,
        })
    }

    /// Starts a session against an in-process simulated terminal.
    ///
    /// With `persisted` the session resumes that pairing; no pairing request
    /// is sent.
    pub fn simulated(
        config: &HarnessConfig,
        persisted: Option<PersistedSession>,
        emitter: Arc<dyn ProjectionEmitter>,
    ) -> HarnessResult<(Self, SimulatedTerminal)> {
        let state = match persisted {
            Some(persisted) => {
                info!(pos_id = %persisted.pos_id, "Resuming persisted session");
                SessionState::resume(persisted)
            }
            None => SessionState::new(
                config.terminal.pos_id.clone(),
                config.terminal.eftpos_address.clone(),
            ),
        };

        let (terminal, events) = SimulatedTerminal::new(
            config.simulator.clone(),
            &state.pos_id,
            &state.terminal_address,
            state.secrets.clone(),
        );

        let session = Session::start(Arc::new(terminal.clone()), events, state, config, emitter)?;
        terminal.start();
        Ok((session, terminal))
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub async fn render_snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await.clone();
        let stats = self.telemetry.lock().await.stats.snapshot_at(clock::now());

        SessionSnapshot {
            state,
            status: self.sdk.current_status(),
            flow: self.sdk.current_flow(),
            pairing: self.sdk.current_pairing_flow_state(),
            tx: self.sdk.current_tx_flow_state(),
            stats,
            driver: self.driver.status(),
            gap: *self.gap.read().await,
            amount_cents: self.amount_cents,
        }
    }

    /// Live statistics of the current (or last) run.
    pub async fn stats(&self) -> StatsSnapshot {
        self.telemetry.lock().await.stats.snapshot_at(clock::now())
    }

    pub fn driver(&self) -> &StressDriver {
        &self.driver
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub async fn set_pos_id(&self, raw: &str) -> HarnessResult<String> {
        let pos_id = raw.trim();
        validate_pos_id(pos_id)?;
        if !self.sdk.set_pos_id(pos_id) {
            return Err(HarnessError::SdkRefused {
                action: "set the POS ID".into(),
            });
        }
        self.state.write().await.pos_id = pos_id.to_string();
        info!(pos_id = %pos_id, "POS id set");
        Ok(pos_id.to_string())
    }

    pub async fn set_terminal_address(&self, raw: &str) -> HarnessResult<String> {
        let address = raw.trim();
        validate_terminal_address(address)?;
        if !self.sdk.set_terminal_address(address) {
            return Err(HarnessError::SdkRefused {
                action: "set the EFTPOS address".into(),
            });
        }
        self.state.write().await.terminal_address = address.to_string();
        info!(address = %address, "Terminal address set");
        Ok(address.to_string())
    }

    // =========================================================================
    // Hammering
    // =========================================================================

    /// Sets the lower gap bound from operator seconds.
    pub async fn set_min_gap(&self, raw: &str) -> HarnessResult<GapRange> {
        let ms = parse_gap_secs("min_gap", raw)?;
        let mut gap = self.gap.write().await;
        *gap = gap.with_min_ms(ms)?;
        debug!(min_gap_ms = ms, "Minimum gap set");
        Ok(*gap)
    }

    /// Sets the upper gap bound from operator seconds.
    pub async fn set_max_gap(&self, raw: &str) -> HarnessResult<GapRange> {
        let ms = parse_gap_secs("max_gap", raw)?;
        let mut gap = self.gap.write().await;
        *gap = gap.with_max_ms(ms)?;
        debug!(max_gap_ms = ms, "Maximum gap set");
        Ok(*gap)
    }

    pub async fn gap(&self) -> GapRange {
        *self.gap.read().await
    }

    /// Starts hammering with the current gaps. False if already active.
    pub async fn start_hammer(&self) -> bool {
        let gap = *self.gap.read().await;
        self.driver.start(gap).await
    }

    /// Asks hammering to stop. False if it was not running.
    pub async fn stop_hammer(&self) -> bool {
        self.driver.stop().await
    }

    // =========================================================================
    // Pairing
    // =========================================================================

    pub async fn pair(&self) -> HarnessResult<()> {
        if !self.sdk.pair() {
            return Err(HarnessError::SdkRefused {
                action: "start pairing".into(),
            });
        }
        self.refresh_flow().await;
        Ok(())
    }

    pub async fn pair_cancel(&self) {
        self.sdk.pairing_cancel();
        self.refresh_flow().await;
    }

    pub async fn pair_confirm(&self) {
        self.sdk.pairing_confirm_code();
        self.refresh_flow().await;
    }

    pub async fn unpair(&self) -> HarnessResult<()> {
        if !self.sdk.unpair() {
            return Err(HarnessError::SdkRefused {
                action: "unpair".into(),
            });
        }
        self.refresh_flow().await;
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Initiates a purchase of the configured test amount.
    pub async fn purchase(&self) -> HarnessResult<String> {
        self.initiate(TransactionType::Purchase, "pizza").await
    }

    /// Initiates a refund of the configured test amount.
    pub async fn refund(&self) -> HarnessResult<String> {
        self.initiate(TransactionType::Refund, "yuck").await
    }

    pub async fn settle(&self) -> HarnessResult<String> {
        self.initiate(TransactionType::Settle, "settle").await
    }

    async fn initiate(&self, tx_type: TransactionType, prefix: &str) -> HarnessResult<String> {
        let id = request_id(prefix);
        let result = match tx_type {
            TransactionType::Purchase => self.sdk.initiate_purchase(&id, self.amount_cents),
            TransactionType::Refund => self.sdk.initiate_refund(&id, self.amount_cents),
            TransactionType::Settle => self.sdk.initiate_settlement(&id),
        };

        if !result.initiated {
            warn!(request_id = %id, tx_type = %tx_type, message = %result.message, "Request not initiated");
            return Err(HarnessError::Rejected {
                message: result.message,
            });
        }

        info!(request_id = %id, tx_type = %tx_type, "Request initiated");
        self.refresh_flow().await;
        Ok(id)
    }

    pub async fn accept_signature(&self, accepted: bool) {
        self.sdk.accept_signature(accepted);
    }

    pub async fn cancel_transaction(&self) {
        self.sdk.cancel_transaction();
    }

    /// Acknowledges a finished flow. False if the flow has not finished.
    pub async fn ack(&self) -> bool {
        let acked = self.sdk.ack_flow_ended_and_back_to_idle();
        self.refresh_flow().await;
        acked
    }

    async fn refresh_flow(&self) {
        let flow = self.sdk.current_flow();
        self.state.write().await.apply_flow(flow);
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Drains the session and returns what should be persisted.
    pub async fn shutdown(self) -> HarnessResult<Option<PersistedSession>> {
        self.driver.stop().await;
        self.driver.wait_idle().await;
        self.projector.shutdown().await?;

        let persisted = self.state.read().await.persisted();
        info!(paired = persisted.is_some(), "Session closed");
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::NoOpEmitter;
    use hammer_core::{OutcomeKind, SuccessState};
    use std::time::Duration;
    use tokio::time::sleep;

    fn fast_config() -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.terminal.pos_id = "HAMMERPOS".into();
        config.terminal.eftpos_address = "10.161.104.104".into();
        config.hammer.min_gap_ms = 1000;
        config.hammer.max_gap_ms = 1000;
        config.simulator.connect_latency_ms = 10;
        config.simulator.pairing_latency_ms = 100;
        config.simulator.tx_latency_ms = 500;
        config.simulator.seed = Some(9);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisted_resume_skips_pairing() {
        let persisted = PersistedSession::parse("POS1:10.0.0.5:ENCKEY:HMACKEY").unwrap();
        let (session, sim) =
            Session::simulated(&fast_config(), Some(persisted.clone()), Arc::new(NoOpEmitter)).unwrap();

        let snap = session.render_snapshot().await;
        assert_eq!(snap.state.pos_id, "POS1");
        assert_eq!(snap.state.terminal_address, "10.0.0.5");
        assert_eq!(sim.pair_calls(), 0);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(session.render_snapshot().await.state.last_known_status, SpiStatus::PairedConnected);

        assert_eq!(session.shutdown().await.unwrap(), Some(persisted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_then_purchase() {
        let (session, _sim) = Session::simulated(&fast_config(), None, Arc::new(NoOpEmitter)).unwrap();

        session.pair().await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(!session.render_snapshot().await.pairing.confirmation_code.is_empty());

        session.pair_confirm().await;
        sleep(Duration::from_millis(10)).await;
        assert!(session.ack().await);

        let snap = session.render_snapshot().await;
        assert_eq!(snap.status, SpiStatus::PairedConnected);
        assert!(snap.state.secrets.is_some());

        let id = session.purchase().await.unwrap();
        assert!(id.starts_with("pizza-"));
        assert!(matches!(session.settle().await, Err(HarnessError::Rejected { .. })));

        sleep(Duration::from_millis(600)).await;
        let snap = session.render_snapshot().await;
        assert!(snap.tx.finished);
        assert_eq!(snap.tx.id, id);
        assert!(session.ack().await);

        assert!(session.shutdown().await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_and_gap_setters() {
        let (session, _sim) = Session::simulated(&fast_config(), None, Arc::new(NoOpEmitter)).unwrap();

        assert_eq!(session.set_pos_id(" CITYPIZZA1 ").await.unwrap(), "CITYPIZZA1");
        assert!(session.set_pos_id("no spaces").await.unwrap_err().is_operator_error());
        assert_eq!(session.render_snapshot().await.state.pos_id, "CITYPIZZA1");

        assert!(session.set_terminal_address("10.0.0.7").await.is_ok());

        let gap = session.set_max_gap("5").await.unwrap();
        assert_eq!(gap.max_ms(), 5000);
        let gap = session.set_min_gap("2").await.unwrap();
        assert_eq!(gap.min_ms(), 2000);
        assert!(session.set_min_gap("9").await.is_err());
        assert!(session.set_min_gap("abc").await.is_err());
        assert_eq!(session.gap().await.min_ms(), 2000);

        session.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_an_active_run() {
        let persisted = PersistedSession::parse("POS1:10.0.0.5:ENCKEY:HMACKEY").unwrap();
        let (session, sim) =
            Session::simulated(&fast_config(), Some(persisted), Arc::new(NoOpEmitter)).unwrap();
        sleep(Duration::from_millis(50)).await;
        sim.script_outcomes([SuccessState::Success]);

        assert!(session.start_hammer().await);
        sleep(Duration::from_millis(700)).await;

        let stats = session.stats().await;
        assert_eq!(stats.count(OutcomeKind::Success), 1);
        assert!(stats.measuring);

        assert!(session.shutdown().await.unwrap().is_some());
    }
}
