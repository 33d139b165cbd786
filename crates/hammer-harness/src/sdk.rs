//! # Terminal SDK Boundary
//!
//! The seam between the harness and the payment-terminal integration SDK.
//! The SDK owns pairing, key exchange, the wire protocol and the connection;
//! the harness only sees snapshots, notifications and request methods.
//!
//! ## Boundary Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   harness ──── requests ────►  ┌────────────────────┐                   │
//! │   (console,                    │    TerminalSdk     │                   │
//! │    driver)  ◄── snapshots ──── │  (SimulatedTerminal│                   │
//! │                                │   or a real SDK)   │                   │
//! │   projector ◄── SpiEvent ───── └────────────────────┘                   │
//! │                 (one channel, four kinds)                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Request methods are synchronous and cheap: they record intent and return;
//! progress is reported later through [`SpiEvent`]s.

use tokio::sync::mpsc;

use hammer_core::{
    InitiateTxResult, PairingFlowState, Secrets, SpiFlow, SpiStatus, TransactionFlowState,
};

// =============================================================================
// Notifications
// =============================================================================

/// One notification from the SDK.
#[derive(Debug, Clone)]
pub enum SpiEvent {
    /// Pairing/connection status changed.
    StatusChanged(SpiStatus),

    /// The pairing flow progressed.
    PairingFlowChanged(PairingFlowState),

    /// New secrets were issued (`Some`) or revoked (`None`).
    SecretsChanged(Option<Secrets>),

    /// The transaction flow progressed.
    TxFlowChanged(TransactionFlowState),
}

impl SpiEvent {
    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SpiEvent::StatusChanged(_) => "status",
            SpiEvent::PairingFlowChanged(_) => "pairing_flow",
            SpiEvent::SecretsChanged(_) => "secrets",
            SpiEvent::TxFlowChanged(_) => "tx_flow",
        }
    }
}

/// Sending half, held by the SDK implementation.
pub type SpiEventSender = mpsc::UnboundedSender<SpiEvent>;

/// Receiving half, handed to the projector.
pub type SpiEventReceiver = mpsc::UnboundedReceiver<SpiEvent>;

/// Creates the notification channel an SDK implementation is built around.
pub fn event_channel() -> (SpiEventSender, SpiEventReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// SDK Trait
// =============================================================================

/// What the harness needs from a terminal SDK.
///
/// Implementations must be shareable across the console, projector and
/// driver tasks.
pub trait TerminalSdk: Send + Sync {
    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    fn current_status(&self) -> SpiStatus;

    fn current_flow(&self) -> SpiFlow;

    fn current_pairing_flow_state(&self) -> PairingFlowState;

    fn current_tx_flow_state(&self) -> TransactionFlowState;

    // -------------------------------------------------------------------------
    // Identity (only while unpaired)
    // -------------------------------------------------------------------------

    /// Returns false when the SDK refuses the change.
    fn set_pos_id(&self, pos_id: &str) -> bool;

    /// Returns false when the SDK refuses the change.
    fn set_terminal_address(&self, address: &str) -> bool;

    // -------------------------------------------------------------------------
    // Pairing
    // -------------------------------------------------------------------------

    /// Starts the pairing flow. Returns false if pairing can't start now.
    fn pair(&self) -> bool;

    fn pairing_cancel(&self);

    /// The operator confirms the code shown on both devices matches.
    fn pairing_confirm_code(&self);

    fn unpair(&self) -> bool;

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    fn initiate_purchase(&self, request_id: &str, amount_cents: i64) -> InitiateTxResult;

    fn initiate_refund(&self, request_id: &str, amount_cents: i64) -> InitiateTxResult;

    fn initiate_settlement(&self, request_id: &str) -> InitiateTxResult;

    fn accept_signature(&self, accepted: bool);

    /// Asks the terminal to cancel. The outcome arrives as a flow update.
    fn cancel_transaction(&self);

    /// Acknowledges a finished pairing or transaction flow and returns the
    /// SDK to `Idle`. Returns false if the current flow has not finished.
    fn ack_flow_ended_and_back_to_idle(&self) -> bool;
}
