//! # Simulated Terminal
//!
//! An in-process [`TerminalSdk`] that behaves like a paired EFTPOS terminal:
//! it pairs, connects, drops its link, runs transactions with a processing
//! delay and reports everything through [`SpiEvent`]s.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Unpaired ──pair──► [Pairing flow] ──confirm──► PairedConnected        │
//! │      ▲                                               │    ▲             │
//! │      │ unpair                              drop_link │    │ latency     │
//! │      │                                               ▼    │             │
//! │      └──────────────────────────────────── PairedConnecting             │
//! │                                                                         │
//! │   Transaction flow (while paired):                                      │
//! │   initiate ──► processing (tx_latency) ──► finished ──ack──► Idle       │
//! │                    │ refund: signature check first                      │
//! │                    │ link down: completion waits for the link           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Test Hooks
//! - [`script_outcomes`](SimulatedTerminal::script_outcomes) - fixed results
//!   for the next transactions
//! - [`reject_next`](SimulatedTerminal::reject_next) - refuse initiation
//! - [`stall_next`](SimulatedTerminal::stall_next) - never finish
//! - [`drop_link`](SimulatedTerminal::drop_link) /
//!   [`restore_link`](SimulatedTerminal::restore_link)
//! - counters: pair calls, initiated transactions, busy rejections

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hammer_core::validation::{validate_pos_id, validate_terminal_address};
use hammer_core::{
    InitiateTxResult, PairingFlowState, Secrets, SpiFlow, SpiStatus, SuccessState,
    TransactionFlowState, TransactionType,
};

use crate::config::SimulatorSettings;
use crate::sdk::{event_channel, SpiEvent, SpiEventReceiver, SpiEventSender, TerminalSdk};

// =============================================================================
// Simulated Terminal
// =============================================================================

/// Cheap-to-clone handle to one simulated terminal.
#[derive(Clone)]
pub struct SimulatedTerminal {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SimulatorSettings,
    events: SpiEventSender,
    state: Mutex<SimState>,
    pair_calls: AtomicU64,
    initiated: AtomicU64,
    busy_rejections: AtomicU64,
}

struct SimState {
    pos_id: String,
    address: String,
    status: SpiStatus,
    flow: SpiFlow,
    secrets: Option<Secrets>,
    pairing: PairingFlowState,
    tx: TransactionFlowState,

    /// Bumped whenever the link or pairing changes, so stale timers can
    /// tell they no longer apply.
    epoch: u64,

    scripted: VecDeque<SuccessState>,
    reject_next: u32,
    stall_next: u32,
    rng: StdRng,
}

impl SimulatedTerminal {
    /// Creates a terminal and the notification channel it reports on.
    ///
    /// With `secrets` the terminal resumes an earlier pairing once
    /// [`start`](Self::start) is called; no pairing flow runs.
    pub fn new(
        settings: SimulatorSettings,
        pos_id: &str,
        address: &str,
        secrets: Option<Secrets>,
    ) -> (Self, SpiEventReceiver) {
        let (events, receiver) = event_channel();
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let state = SimState {
            pos_id: pos_id.to_string(),
            address: address.to_string(),
            status: SpiStatus::Unpaired,
            flow: SpiFlow::Idle,
            secrets,
            pairing: PairingFlowState::default(),
            tx: TransactionFlowState::default(),
            epoch: 0,
            scripted: VecDeque::new(),
            reject_next: 0,
            stall_next: 0,
            rng,
        };

        let terminal = SimulatedTerminal {
            inner: Arc::new(Inner {
                settings,
                events,
                state: Mutex::new(state),
                pair_calls: AtomicU64::new(0),
                initiated: AtomicU64::new(0),
                busy_rejections: AtomicU64::new(0),
            }),
        };

        (terminal, receiver)
    }

    /// Brings the terminal up. Must be called inside a tokio runtime.
    pub fn start(&self) {
        {
            let mut s = self.inner.lock();
            if s.secrets.is_some() && s.status == SpiStatus::Unpaired {
                info!(pos_id = %s.pos_id, address = %s.address, "Resuming pairing from persisted secrets");
                s.status = SpiStatus::PairedConnecting;
                s.epoch += 1;
                self.inner.emit(SpiEvent::StatusChanged(SpiStatus::PairedConnecting));
                Inner::schedule_connect(&self.inner, s.epoch);
            }
        }

        if self.inner.settings.flap_interval_secs > 0 {
            Inner::spawn_flapper(Arc::downgrade(&self.inner), self.inner.settings.flap_interval_secs);
        }
    }

    // =========================================================================
    // Test Hooks
    // =========================================================================

    /// Fixes the results of the next transactions, in order.
    pub fn script_outcomes(&self, outcomes: impl IntoIterator<Item = SuccessState>) {
        self.inner.lock().scripted.extend(outcomes);
    }

    /// Refuses the next `count` initiate requests.
    pub fn reject_next(&self, count: u32) {
        self.inner.lock().reject_next += count;
    }

    /// Accepts the next `count` transactions but never finishes them.
    pub fn stall_next(&self, count: u32) {
        self.inner.lock().stall_next += count;
    }

    /// Drops a connected link; it comes back after the connect latency.
    pub fn drop_link(&self) {
        Inner::drop_link(&self.inner);
    }

    /// Brings a dropped link back immediately.
    pub fn restore_link(&self) {
        let mut s = self.inner.lock();
        if s.status == SpiStatus::PairedConnecting && s.secrets.is_some() {
            s.epoch += 1;
            s.status = SpiStatus::PairedConnected;
            self.inner.emit(SpiEvent::StatusChanged(SpiStatus::PairedConnected));
        }
    }

    pub fn pair_calls(&self) -> u64 {
        self.inner.pair_calls.load(Ordering::SeqCst)
    }

    pub fn initiated_count(&self) -> u64 {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// Initiate requests refused because another flow was active.
    pub fn busy_rejections(&self) -> u64 {
        self.inner.busy_rejections.load(Ordering::SeqCst)
    }

    pub fn secrets(&self) -> Option<Secrets> {
        self.inner.lock().secrets.clone()
    }
}

// =============================================================================
// Internals
// =============================================================================

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SpiEvent) {
        if self.events.send(event).is_err() {
            debug!("No one is listening for terminal events");
        }
    }

    fn latency(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn drop_link(inner: &Arc<Inner>) {
        let mut s = inner.lock();
        if s.status != SpiStatus::PairedConnected {
            return;
        }
        s.epoch += 1;
        s.status = SpiStatus::PairedConnecting;
        info!("Simulated link dropped");
        inner.emit(SpiEvent::StatusChanged(SpiStatus::PairedConnecting));
        Inner::schedule_connect(inner, s.epoch);
    }

    fn schedule_connect(inner: &Arc<Inner>, epoch: u64) {
        let inner = inner.clone();
        tokio::spawn(async move {
            sleep(Self::latency(inner.settings.connect_latency_ms)).await;
            let mut s = inner.lock();
            if s.epoch == epoch && s.status == SpiStatus::PairedConnecting && s.secrets.is_some() {
                s.status = SpiStatus::PairedConnected;
                inner.emit(SpiEvent::StatusChanged(SpiStatus::PairedConnected));
            }
        });
    }

    fn spawn_flapper(weak: Weak<Inner>, every_secs: u64) {
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(every_secs)).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Inner::drop_link(&inner);
            }
        });
    }

    fn schedule_pairing_code(inner: &Arc<Inner>, epoch: u64) {
        let inner = inner.clone();
        tokio::spawn(async move {
            sleep(Self::latency(inner.settings.pairing_latency_ms)).await;
            let mut s = inner.lock();
            if s.epoch != epoch || s.flow != SpiFlow::Pairing || s.pairing.finished {
                return;
            }
            let code: u32 = s.rng.gen_range(0..1_000_000);
            s.pairing.confirmation_code = format!("{:06}", code);
            s.pairing.awaiting_check_from_eftpos = true;
            s.pairing.awaiting_check_from_pos = true;
            s.pairing.message = "Confirm that the following Code is showing on the Terminal".into();
            inner.emit(SpiEvent::PairingFlowChanged(s.pairing.clone()));
        });
    }

    fn schedule_signature_check(inner: &Arc<Inner>, request_id: String) {
        let inner = inner.clone();
        tokio::spawn(async move {
            sleep(Self::latency(inner.settings.tx_latency_ms)).await;
            let mut s = inner.lock();
            if s.tx.id != request_id || s.tx.finished || s.tx.attempting_to_cancel {
                return;
            }
            s.tx.awaiting_signature_check = true;
            s.tx.display_message = "Please check the customer's signature".into();
            inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
        });
    }

    /// Finishes `request_id` after the processing delay, waiting for the
    /// link if it is down.
    fn schedule_completion(inner: &Arc<Inner>, request_id: String) {
        let inner = inner.clone();
        tokio::spawn(async move {
            loop {
                sleep(Self::latency(inner.settings.tx_latency_ms)).await;
                let mut s = inner.lock();
                if s.tx.id != request_id || s.tx.finished {
                    return;
                }
                match s.status {
                    SpiStatus::PairedConnected => {
                        let outcome = s.next_outcome(&inner.settings);
                        s.finish(outcome);
                        inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
                        return;
                    }
                    SpiStatus::PairedConnecting => {
                        s.tx.display_message = "Waiting for EFTPOS connection".into();
                        continue;
                    }
                    SpiStatus::Unpaired => {
                        s.finish(SuccessState::Unknown);
                        inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
                        return;
                    }
                }
            }
        });
    }
}

impl SimState {
    fn next_outcome(&mut self, settings: &SimulatorSettings) -> SuccessState {
        if let Some(outcome) = self.scripted.pop_front() {
            return outcome;
        }

        let total = settings.success_weight + settings.failed_weight + settings.unknown_weight;
        if total == 0 {
            return SuccessState::Success;
        }
        let draw = self.rng.gen_range(0..total);
        if draw < settings.success_weight {
            SuccessState::Success
        } else if draw < settings.success_weight + settings.failed_weight {
            SuccessState::Failed
        } else {
            SuccessState::Unknown
        }
    }

    fn finish(&mut self, outcome: SuccessState) {
        let rrn = format!("{:012}", self.rng.gen_range(0..1_000_000_000_000u64));
        let approved = outcome == SuccessState::Success;
        let (host_text, settle_text) = if approved {
            ("APPROVED", "SETTLEMENT SUCCESSFUL")
        } else {
            ("DECLINED", "SETTLEMENT FAILED")
        };

        self.tx.finished = true;
        self.tx.success = outcome;
        self.tx.awaiting_signature_check = false;
        self.tx.display_message = match outcome {
            SuccessState::Success => format!("{} Approved", self.tx.tx_type),
            SuccessState::Failed => format!("{} Declined", self.tx.tx_type),
            SuccessState::Unknown => format!("{} result unknown", self.tx.tx_type),
        };

        self.tx.response = match (outcome, self.tx.tx_type) {
            (SuccessState::Unknown, _) => None,
            (_, TransactionType::Settle) => Some(json!({
                "success": approved,
                "host_response_text": settle_text,
                "merchant_receipt": format!("SETTLEMENT\n{}\n", self.pos_id),
            })),
            (_, tx_type) => Some(json!({
                "success": approved,
                "rrn": rrn,
                "scheme_name": "Visa",
                "host_response_text": host_text,
                "customer_receipt": format!(
                    "{}\n{} ${}.{:02}\nRRN {}\n",
                    self.pos_id,
                    tx_type,
                    self.tx.amount_cents / 100,
                    self.tx.amount_cents % 100,
                    rrn
                ),
            })),
        };
    }
}

// =============================================================================
// SDK Implementation
// =============================================================================

impl SimulatedTerminal {
    fn initiate(&self, tx_type: TransactionType, request_id: &str, amount_cents: i64) -> InitiateTxResult {
        let mut s = self.inner.lock();

        if s.flow != SpiFlow::Idle {
            self.inner.busy_rejections.fetch_add(1, Ordering::SeqCst);
            return InitiateTxResult::rejected("Not Idle");
        }
        if s.status == SpiStatus::Unpaired {
            return InitiateTxResult::rejected("Not Paired");
        }
        if s.reject_next > 0 {
            s.reject_next -= 1;
            return InitiateTxResult::rejected("EFTPOS declined to start the transaction");
        }

        self.inner.initiated.fetch_add(1, Ordering::SeqCst);
        s.flow = SpiFlow::Transaction;
        s.tx = TransactionFlowState::started(request_id, tx_type, amount_cents);
        self.inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
        debug!(request_id = %request_id, tx_type = %tx_type, amount_cents, "Transaction initiated");

        if s.stall_next > 0 {
            s.stall_next -= 1;
            warn!(request_id = %request_id, "Simulated terminal will never finish this transaction");
        } else if tx_type == TransactionType::Refund && self.inner.settings.signature_on_refund {
            Inner::schedule_signature_check(&self.inner, request_id.to_string());
        } else {
            Inner::schedule_completion(&self.inner, request_id.to_string());
        }

        InitiateTxResult::accepted(format!("{} Initiated", tx_type))
    }
}

impl TerminalSdk for SimulatedTerminal {
    fn current_status(&self) -> SpiStatus {
        self.inner.lock().status
    }

    fn current_flow(&self) -> SpiFlow {
        self.inner.lock().flow
    }

    fn current_pairing_flow_state(&self) -> PairingFlowState {
        self.inner.lock().pairing.clone()
    }

    fn current_tx_flow_state(&self) -> TransactionFlowState {
        self.inner.lock().tx.clone()
    }

    fn set_pos_id(&self, pos_id: &str) -> bool {
        let mut s = self.inner.lock();
        if s.status != SpiStatus::Unpaired || s.flow != SpiFlow::Idle {
            return false;
        }
        if validate_pos_id(pos_id).is_err() {
            return false;
        }
        s.pos_id = pos_id.to_string();
        true
    }

    fn set_terminal_address(&self, address: &str) -> bool {
        let mut s = self.inner.lock();
        if s.status != SpiStatus::Unpaired || s.flow != SpiFlow::Idle {
            return false;
        }
        if validate_terminal_address(address).is_err() {
            return false;
        }
        s.address = address.to_string();
        true
    }

    fn pair(&self) -> bool {
        self.inner.pair_calls.fetch_add(1, Ordering::SeqCst);
        let mut s = self.inner.lock();
        if s.status != SpiStatus::Unpaired || s.flow != SpiFlow::Idle {
            return false;
        }
        if s.pos_id.is_empty() || s.address.is_empty() {
            warn!("Cannot pair without a POS id and terminal address");
            return false;
        }

        s.epoch += 1;
        s.flow = SpiFlow::Pairing;
        s.pairing = PairingFlowState {
            message: "Requesting to Pair...".into(),
            ..Default::default()
        };
        self.inner.emit(SpiEvent::PairingFlowChanged(s.pairing.clone()));
        Inner::schedule_pairing_code(&self.inner, s.epoch);
        true
    }

    fn pairing_cancel(&self) {
        let mut s = self.inner.lock();
        if s.flow != SpiFlow::Pairing || s.pairing.finished {
            return;
        }
        s.epoch += 1;
        s.pairing.finished = true;
        s.pairing.successful = false;
        s.pairing.awaiting_check_from_eftpos = false;
        s.pairing.awaiting_check_from_pos = false;
        s.pairing.message = "Pairing Cancelled".into();
        self.inner.emit(SpiEvent::PairingFlowChanged(s.pairing.clone()));
    }

    fn pairing_confirm_code(&self) {
        let mut s = self.inner.lock();
        if s.flow != SpiFlow::Pairing || s.pairing.finished || !s.pairing.awaiting_check_from_pos {
            return;
        }

        let secrets = Secrets::new(
            Uuid::new_v4().simple().to_string().to_uppercase(),
            Uuid::new_v4().simple().to_string().to_uppercase(),
        );
        s.secrets = Some(secrets.clone());
        s.status = SpiStatus::PairedConnected;
        s.pairing.awaiting_check_from_eftpos = false;
        s.pairing.awaiting_check_from_pos = false;
        s.pairing.finished = true;
        s.pairing.successful = true;
        s.pairing.message = "Pairing Successful!".into();

        info!(pos_id = %s.pos_id, "Simulated pairing complete");
        self.inner.emit(SpiEvent::SecretsChanged(Some(secrets)));
        self.inner.emit(SpiEvent::StatusChanged(SpiStatus::PairedConnected));
        self.inner.emit(SpiEvent::PairingFlowChanged(s.pairing.clone()));
    }

    fn unpair(&self) -> bool {
        let mut s = self.inner.lock();
        if s.status == SpiStatus::Unpaired || s.flow != SpiFlow::Idle {
            return false;
        }
        s.epoch += 1;
        s.status = SpiStatus::Unpaired;
        s.secrets = None;
        self.inner.emit(SpiEvent::SecretsChanged(None));
        self.inner.emit(SpiEvent::StatusChanged(SpiStatus::Unpaired));
        true
    }

    fn initiate_purchase(&self, request_id: &str, amount_cents: i64) -> InitiateTxResult {
        self.initiate(TransactionType::Purchase, request_id, amount_cents)
    }

    fn initiate_refund(&self, request_id: &str, amount_cents: i64) -> InitiateTxResult {
        self.initiate(TransactionType::Refund, request_id, amount_cents)
    }

    fn initiate_settlement(&self, request_id: &str) -> InitiateTxResult {
        self.initiate(TransactionType::Settle, request_id, 0)
    }

    fn accept_signature(&self, accepted: bool) {
        let mut s = self.inner.lock();
        if s.flow != SpiFlow::Transaction || !s.tx.awaiting_signature_check {
            return;
        }
        s.tx.awaiting_signature_check = false;

        if accepted {
            s.tx.display_message = "Signature accepted, finishing transaction".into();
            self.inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
            Inner::schedule_completion(&self.inner, s.tx.id.clone());
        } else {
            s.finish(SuccessState::Failed);
            s.tx.display_message = "Signature Declined".into();
            self.inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
        }
    }

    fn cancel_transaction(&self) {
        let mut s = self.inner.lock();
        if s.flow != SpiFlow::Transaction || s.tx.finished || s.tx.attempting_to_cancel {
            return;
        }
        s.tx.attempting_to_cancel = true;
        s.tx.display_message = "Attempting to Cancel Transaction...".into();
        self.inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));

        s.finish(SuccessState::Failed);
        s.tx.display_message = "Transaction Cancelled".into();
        self.inner.emit(SpiEvent::TxFlowChanged(s.tx.clone()));
    }

    fn ack_flow_ended_and_back_to_idle(&self) -> bool {
        let mut s = self.inner.lock();
        let finished = match s.flow {
            SpiFlow::Idle => return true,
            SpiFlow::Pairing => s.pairing.finished,
            SpiFlow::Transaction => s.tx.finished,
        };
        if finished {
            s.flow = SpiFlow::Idle;
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_settings() -> SimulatorSettings {
        SimulatorSettings {
            connect_latency_ms: 100,
            pairing_latency_ms: 100,
            tx_latency_ms: 500,
            seed: Some(7),
            ..Default::default()
        }
    }

    async fn next_status(rx: &mut SpiEventReceiver) -> SpiStatus {
        loop {
            match rx.recv().await {
                Some(SpiEvent::StatusChanged(status)) => return status,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_connects_without_pairing() {
        let (sim, mut rx) = SimulatedTerminal::new(
            fast_settings(),
            "POS1",
            "10.0.0.5",
            Some(Secrets::new("ENC", "HMAC")),
        );
        sim.start();

        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnecting);
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnected);
        assert_eq!(sim.pair_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_flow() {
        let (sim, mut rx) = SimulatedTerminal::new(fast_settings(), "POS1", "10.0.0.5", None);
        sim.start();

        assert!(sim.pair());
        assert_eq!(sim.current_flow(), SpiFlow::Pairing);

        // Wait for the confirmation code.
        loop {
            if let Some(SpiEvent::PairingFlowChanged(p)) = rx.recv().await {
                if p.awaiting_check_from_pos {
                    assert_eq!(p.confirmation_code.len(), 6);
                    break;
                }
            }
        }

        sim.pairing_confirm_code();
        assert_eq!(sim.current_status(), SpiStatus::PairedConnected);
        assert!(sim.secrets().is_some());
        assert!(sim.current_pairing_flow_state().successful);
        assert!(sim.ack_flow_ended_and_back_to_idle());
        assert_eq!(sim.current_flow(), SpiFlow::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purchase_runs_to_scripted_outcome() {
        let (sim, mut rx) =
            SimulatedTerminal::new(fast_settings(), "POS1", "10.0.0.5", Some(Secrets::new("E", "H")));
        sim.start();
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnecting);
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnected);

        sim.script_outcomes([SuccessState::Failed]);
        assert!(sim.initiate_purchase("prchs-1", 1000).initiated);

        // A second request while the first is in flight is refused.
        assert!(!sim.initiate_purchase("prchs-2", 1000).initiated);
        assert_eq!(sim.busy_rejections(), 1);
        assert!(!sim.ack_flow_ended_and_back_to_idle());

        loop {
            if let Some(SpiEvent::TxFlowChanged(tx)) = rx.recv().await {
                if tx.finished {
                    assert_eq!(tx.id, "prchs-1");
                    assert_eq!(tx.success, SuccessState::Failed);
                    break;
                }
            }
        }
        assert!(sim.ack_flow_ended_and_back_to_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_waits_for_signature() {
        let (sim, mut rx) =
            SimulatedTerminal::new(fast_settings(), "POS1", "10.0.0.5", Some(Secrets::new("E", "H")));
        sim.start();
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnecting);
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnected);

        assert!(sim.initiate_refund("yuck-1", 1000).initiated);
        loop {
            if let Some(SpiEvent::TxFlowChanged(tx)) = rx.recv().await {
                if tx.awaiting_signature_check {
                    break;
                }
            }
        }

        sim.accept_signature(false);
        let tx = sim.current_tx_flow_state();
        assert!(tx.finished);
        assert_eq!(tx.success, SuccessState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaired_terminal_rejects_and_unpair_revokes() {
        let (sim, mut rx) =
            SimulatedTerminal::new(fast_settings(), "POS1", "10.0.0.5", Some(Secrets::new("E", "H")));

        // Not started yet: still unpaired.
        let result = sim.initiate_purchase("prchs-1", 1000);
        assert!(!result.initiated);
        assert_eq!(result.message, "Not Paired");

        sim.start();
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnecting);
        assert!(!sim.set_pos_id("OTHER"));

        assert!(sim.unpair());
        assert!(sim.secrets().is_none());
        assert!(matches!(rx.recv().await, Some(SpiEvent::SecretsChanged(None))));
        assert_eq!(next_status(&mut rx).await, SpiStatus::Unpaired);
        assert!(sim.set_pos_id("OTHER"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_finishes_a_stalled_transaction() {
        let (sim, mut rx) =
            SimulatedTerminal::new(fast_settings(), "POS1", "10.0.0.5", Some(Secrets::new("E", "H")));
        sim.start();
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnecting);
        assert_eq!(next_status(&mut rx).await, SpiStatus::PairedConnected);

        sim.stall_next(1);
        assert!(sim.initiate_purchase("prchs-1", 1000).initiated);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!sim.current_tx_flow_state().finished);

        sim.cancel_transaction();
        assert!(sim.current_tx_flow_state().finished);
        assert!(sim.ack_flow_ended_and_back_to_idle());
    }
}
