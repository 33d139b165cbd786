//! # SDK Value Types
//!
//! Values the terminal SDK reports. The harness mirrors these but never
//! mutates the SDK's own copies.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SDK Value Types                                 │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │   SpiStatus     │   │    SpiFlow      │   │  SuccessState   │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  Unpaired       │   │  Idle           │   │  Success        │        │
//! │  │  PairedConn-ing │   │  Pairing        │   │  Failed         │        │
//! │  │  PairedConn-ed  │   │  Transaction    │   │  Unknown        │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌───────────────────────┐  ┌──────────────┐   │
//! │  │  PairingFlowState   │  │ TransactionFlowState  │  │   Secrets    │   │
//! │  │  code, awaiting_*,  │  │ id, type, amount,     │  │  enc_key     │   │
//! │  │  finished, success  │  │ finished, success,    │  │  hmac_key    │   │
//! │  │                     │  │ response (opaque)     │  │              │   │
//! │  └─────────────────────┘  └───────────────────────┘  └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// Status & Flow
// =============================================================================

/// Pairing/connection status of the terminal link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiStatus {
    /// No secrets; nothing to connect with.
    Unpaired,
    /// Paired, link currently down or being re-established.
    PairedConnecting,
    /// Paired and the link is up.
    PairedConnected,
}

impl SpiStatus {
    /// Returns true for both paired states.
    pub fn is_paired(&self) -> bool {
        !matches!(self, SpiStatus::Unpaired)
    }
}

impl fmt::Display for SpiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpiStatus::Unpaired => write!(f, "Unpaired"),
            SpiStatus::PairedConnecting => write!(f, "PairedConnecting"),
            SpiStatus::PairedConnected => write!(f, "PairedConnected"),
        }
    }
}

/// The SDK's top-level mode. At most one flow is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiFlow {
    #[default]
    Idle,
    Pairing,
    Transaction,
}

impl fmt::Display for SpiFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpiFlow::Idle => write!(f, "Idle"),
            SpiFlow::Pairing => write!(f, "Pairing"),
            SpiFlow::Transaction => write!(f, "Transaction"),
        }
    }
}

// =============================================================================
// Transaction Values
// =============================================================================

/// Terminal result of a finished transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SuccessState {
    Success,
    Failed,
    /// Ambiguous; the operator must check the terminal's last transaction.
    #[default]
    Unknown,
}

impl fmt::Display for SuccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessState::Success => write!(f, "Success"),
            SuccessState::Failed => write!(f, "Failed"),
            SuccessState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kind of transaction a flow is carrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Purchase,
    Refund,
    Settle,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Purchase => write!(f, "Purchase"),
            TransactionType::Refund => write!(f, "Refund"),
            TransactionType::Settle => write!(f, "Settle"),
        }
    }
}

/// Progress of the current (or most recent) transaction flow.
///
/// ## Lifecycle
/// ```text
/// initiate ──► finished=false ──► (signature? cancel?) ──► finished=true
///                                                              │
///                                                 ack ◄────────┘
///                                          (flow back to Idle)
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionFlowState {
    /// Request identifier supplied at initiation.
    pub id: String,

    pub tx_type: TransactionType,

    /// Text the terminal wants shown to the operator.
    pub display_message: String,

    pub amount_cents: i64,

    pub awaiting_signature_check: bool,

    pub attempting_to_cancel: bool,

    pub finished: bool,

    /// Only meaningful once `finished` is true.
    pub success: SuccessState,

    /// Opaque response payload; receipts and RRNs live in here.
    pub response: Option<serde_json::Value>,
}

impl TransactionFlowState {
    /// Creates the initial state of a freshly initiated transaction.
    pub fn started(id: impl Into<String>, tx_type: TransactionType, amount_cents: i64) -> Self {
        TransactionFlowState {
            id: id.into(),
            tx_type,
            display_message: format!("Waiting for EFTPOS to process {}", tx_type),
            amount_cents,
            ..Default::default()
        }
    }

    /// Returns the amount as Money (for display).
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// True once the flow for `request_id` has reached its terminal state.
    pub fn is_finished_for(&self, request_id: &str) -> bool {
        self.finished && self.id == request_id
    }
}

/// Progress of the pairing flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingFlowState {
    pub message: String,
    pub confirmation_code: String,
    pub awaiting_check_from_eftpos: bool,
    pub awaiting_check_from_pos: bool,
    pub finished: bool,
    pub successful: bool,
}

/// Answer to an initiate-* request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateTxResult {
    pub initiated: bool,
    pub message: String,
}

impl InitiateTxResult {
    pub fn accepted(message: impl Into<String>) -> Self {
        InitiateTxResult {
            initiated: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        InitiateTxResult {
            initiated: false,
            message: message.into(),
        }
    }
}

// =============================================================================
// Secrets
// =============================================================================

/// Symmetric key material issued once pairing succeeds.
///
/// `Debug` never prints the keys. Key material leaves the process only
/// through [`crate::PersistedSession`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    pub enc_key: String,
    pub hmac_key: String,
}

impl Secrets {
    pub fn new(enc_key: impl Into<String>, hmac_key: impl Into<String>) -> Self {
        Secrets {
            enc_key: enc_key.into(),
            hmac_key: hmac_key.into(),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("enc_key", &"<redacted>")
            .field("hmac_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Request Identifiers
// =============================================================================

/// Builds a unique request id with a short human prefix, e.g. `prchs-3f2a…`.
pub fn request_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_paired() {
        assert!(!SpiStatus::Unpaired.is_paired());
        assert!(SpiStatus::PairedConnecting.is_paired());
        assert!(SpiStatus::PairedConnected.is_paired());
    }

    #[test]
    fn test_finished_for_matches_request_id() {
        let mut state = TransactionFlowState::started("prchs-1", TransactionType::Purchase, 1000);
        assert!(!state.is_finished_for("prchs-1"));

        state.finished = true;
        assert!(state.is_finished_for("prchs-1"));
        assert!(!state.is_finished_for("prchs-2"));
    }

    #[test]
    fn test_request_ids_are_unique_and_prefixed() {
        let a = request_id("prchs");
        let b = request_id("prchs");
        assert!(a.starts_with("prchs-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_secrets_debug_is_redacted() {
        let secrets = Secrets::new("ENCKEY", "HMACKEY");
        let printed = format!("{:?}", secrets);
        assert!(!printed.contains("ENCKEY"));
        assert!(!printed.contains("HMACKEY"));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SpiStatus::PairedConnected).unwrap();
        assert_eq!(json, "\"paired_connected\"");
    }
}
