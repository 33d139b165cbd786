//! # hammer-harness: Terminal Session Runtime
//!
//! This crate runs a payment-terminal session on tokio. It mirrors what the
//! terminal SDK reports, keeps run statistics, and drives back-to-back
//! purchases for soak testing.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Session Runtime                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                      Session (context object)                    │   │
//! │  │                                                                  │   │
//! │  │  Built by the console, torn down on exit                         │   │
//! │  │  Owns the SDK handle, state, telemetry, projector and driver     │   │
//! │  └────────────────────────────┬─────────────────────────────────────┘   │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                   │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐     │
//! │  │ EventProjector │  │  StressDriver  │  │  TerminalSdk           │     │
//! │  │                │  │                │  │                        │     │
//! │  │ One task over  │  │ Purchase, wait │  │ Trait at the SDK seam  │     │
//! │  │ SDK events     │  │ for completion,│  │ SimulatedTerminal for  │     │
//! │  │ Status → stats │  │ ack, sleep gap │  │ demos and tests        │     │
//! │  │ Finished tx →  │  │                │  │                        │     │
//! │  │ completion     │  │                │  │                        │     │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘     │
//! │                                                                         │
//! │  SHARED STATE:                                                          │
//! │  • RwLock<SessionState>       - mirrored identity, secrets, status      │
//! │  • Mutex<Telemetry>           - stats accumulator + run phase           │
//! │  • watch<TransactionFlowState> - latest finished transaction            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`session`] - `Session` context and render snapshot
//! - [`projector`] - SDK notification projector
//! - [`driver`] - Stress driver run loop
//! - [`completion`] - Transaction completion signal and wait
//! - [`telemetry`] - Shared stats + run phase
//! - [`sdk`] - `TerminalSdk` trait and notification types
//! - [`simulator`] - In-process simulated terminal
//! - [`config`] - Harness configuration (TOML + env)
//! - [`error`] - Harness error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hammer_harness::{HarnessConfig, NoOpEmitter, Session};
//!
//! let config = HarnessConfig::load(None)?;
//! let (session, _terminal) = Session::simulated(&config, None, Arc::new(NoOpEmitter))?;
//!
//! session.start_hammer().await;
//! // ...
//! session.stop_hammer().await;
//! let persisted = session.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod completion;
pub mod config;
pub mod driver;
pub mod error;
pub mod projector;
pub mod sdk;
pub mod session;
pub mod simulator;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use completion::{CompletionSignal, WaitPolicy};
pub use config::{HammerSettings, HarnessConfig, LoggingSettings, SimulatorSettings, TerminalSettings};
pub use driver::{DriverSettings, DriverStatus, StressDriver};
pub use error::{HarnessError, HarnessResult};
pub use projector::{EventProjector, NoOpEmitter, ProjectionEmitter, ProjectorHandle, RenderReason};
pub use sdk::{SpiEvent, SpiEventReceiver, SpiEventSender, TerminalSdk};
pub use session::{Session, SessionSnapshot};
pub use simulator::SimulatedTerminal;
pub use telemetry::{RunPhase, SharedTelemetry, Telemetry};
