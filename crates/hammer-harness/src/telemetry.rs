//! # Shared Telemetry
//!
//! The statistics accumulator and the stress-run phase live behind one
//! lock, so "is a run active" and "which counters does it write to" can
//! never disagree.
//!
//! ```text
//!   projector ──record_status_transition──┐
//!   driver    ──record_attempt/outcome────┼──► Mutex<Telemetry>
//!   console   ──snapshot (copy only)──────┘      { stats, phase }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use hammer_core::StatsAccumulator;

/// Phase of the stress run.
///
/// ```text
///   Idle ──start──► Running ──stop──► Stopping ──loop drains──► Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl RunPhase {
    /// True while a loop task exists (Running or Stopping).
    pub fn is_active(&self) -> bool {
        !matches!(self, RunPhase::Idle)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Stopping => write!(f, "stopping"),
        }
    }
}

/// Counters plus run phase.
#[derive(Debug, Default)]
pub struct Telemetry {
    pub stats: StatsAccumulator,
    pub phase: RunPhase,
}

/// Shared handle used by every context of a session.
pub type SharedTelemetry = Arc<Mutex<Telemetry>>;

pub fn shared() -> SharedTelemetry {
    Arc::new(Mutex::new(Telemetry::default()))
}

/// Clock readings for the accumulator.
///
/// Monotonic time comes from tokio so a paused test runtime controls it.
pub mod clock {
    use chrono::{DateTime, Utc};
    use std::time::Instant;

    pub fn now() -> Instant {
        tokio::time::Instant::now().into_std()
    }

    pub fn wall() -> DateTime<Utc> {
        Utc::now()
    }
}
