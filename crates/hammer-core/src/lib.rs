//! # hammer-core: Pure Session & Telemetry Logic
//!
//! This crate holds everything about a terminal session that can be
//! expressed without I/O: the values the terminal SDK reports, the session
//! state mirrored from it, and the statistics a stress run accumulates.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        spi-hammer Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                 Operator Console (apps/console)                 │    │
//! │  │    hammer / stop / min_gap / pair / pizza / settle / ok ...     │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │          hammer-harness (projector, driver, SDK boundary)       │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ hammer-core (THIS CRATE) ★                      │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │      │
//! │  │   │   types   │  │  session  │  │   stats   │  │ validation│  │      │
//! │  │   │ SpiStatus │  │ Session-  │  │ StatsAcc- │  │  pos id   │  │      │
//! │  │   │ TxFlow    │  │ State     │  │ umulator  │  │  gaps     │  │      │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │      │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO CLOCK READS • NO TASKS • PURE FUNCTIONS          │     │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Values reported by the terminal SDK (status, flows, secrets)
//! - [`session`] - Mirrored session state and the persisted-session codec
//! - [`stats`] - Stress-run statistics accumulator
//! - [`gap`] - Inter-transaction gap bounds
//! - [`money`] - Integer cents amount type
//! - [`validation`] - Operator input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use hammer_core::{OutcomeKind, SpiStatus, StatsAccumulator};
//!
//! let t0 = Instant::now();
//! let mut stats = StatsAccumulator::new();
//! stats.reset(SpiStatus::PairedConnected, t0, chrono::Utc::now());
//!
//! stats.record_attempt();
//! stats.record_outcome(OutcomeKind::Success);
//!
//! stats.record_status_transition(SpiStatus::PairedConnecting, t0 + Duration::from_secs(4));
//! stats.finalize(t0 + Duration::from_secs(6), chrono::Utc::now());
//!
//! let snap = stats.snapshot();
//! assert_eq!(snap.connected, Duration::from_secs(4));
//! assert_eq!(snap.disconnected, Duration::from_secs(2));
//! assert_eq!(snap.outcomes_total(), snap.attempts);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod gap;
pub mod money;
pub mod session;
pub mod stats;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use gap::GapRange;
pub use money::Money;
pub use session::{PersistedSession, SecretsAction, SessionState};
pub use stats::{OutcomeKind, StatsAccumulator, StatsSnapshot};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Amount the stress driver and the pizza console charge per transaction.
///
/// Ten dollars, the same fixed test amount for every generated purchase.
pub const TEST_AMOUNT_CENTS: i64 = 1000;

/// Default lower bound of the gap between generated transactions.
pub const DEFAULT_MIN_GAP_MS: u64 = 10_000;

/// Default upper bound of the gap between generated transactions.
pub const DEFAULT_MAX_GAP_MS: u64 = 20_000;

/// Longest POS identifier the terminal accepts.
pub const MAX_POS_ID_LEN: usize = 16;
