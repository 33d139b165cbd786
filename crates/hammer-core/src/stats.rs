//! # Stress-Run Statistics
//!
//! Cumulative counters for one stress run: how many purchases were tried,
//! how they ended, and how long the terminal link spent up versus down.
//!
//! ## Interval Accounting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   reset(t0)      Connecting(t1)       Connected(t2)      finalize(t3)   │
//! │      │                 │                    │                  │        │
//! │      ├── connected ────┼──── disconnected ──┼──── connected ───┤        │
//! │      │                 │ disconnects += 1   │ reconnects += 1  │        │
//! │                                                                         │
//! │   Unpaired: the open interval is flushed into its bucket, nothing is    │
//! │   counted, and the time until the next paired status accrues nowhere.   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The accumulator never reads a clock. Callers pass `now` in, which keeps
//! the accounting exact under a paused test clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::types::{SpiStatus, SuccessState};

// =============================================================================
// Outcome Kind
// =============================================================================

/// How one stress-run attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failed,
    Unknown,
    /// The SDK refused to initiate the purchase.
    Rejected,
}

impl From<SuccessState> for OutcomeKind {
    fn from(state: SuccessState) -> Self {
        match state {
            SuccessState::Success => OutcomeKind::Success,
            SuccessState::Failed => OutcomeKind::Failed,
            SuccessState::Unknown => OutcomeKind::Unknown,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "Success"),
            OutcomeKind::Failed => write!(f, "Failed"),
            OutcomeKind::Unknown => write!(f, "Unknown"),
            OutcomeKind::Rejected => write!(f, "Rejected"),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable copy of the counters, safe to render or log as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub outcome_counts: BTreeMap<OutcomeKind, u64>,
    pub connected: Duration,
    pub disconnected: Duration,
    pub disconnects: u64,
    pub reconnects: u64,
    /// True between `reset` and `finalize`.
    pub measuring: bool,
    /// Monotonic run length; only known once the run is finalized.
    pub elapsed: Option<Duration>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    /// Count for one outcome kind (absent keys count as zero).
    pub fn count(&self, kind: OutcomeKind) -> u64 {
        self.outcome_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn outcomes_total(&self) -> u64 {
        self.outcome_counts.values().sum()
    }

    /// Attempts that have been initiated but not yet given an outcome.
    pub fn in_flight(&self) -> u64 {
        self.attempts.saturating_sub(self.outcomes_total())
    }
}

// =============================================================================
// Accumulator
// =============================================================================

/// Mutable statistics for the current (or last) stress run.
///
/// Not synchronized; the harness keeps it behind its telemetry lock.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    attempts: u64,
    outcome_counts: BTreeMap<OutcomeKind, u64>,
    connected: Duration,
    disconnected: Duration,
    last_connect_at: Option<Instant>,
    last_disconnect_at: Option<Instant>,
    disconnects: u64,
    reconnects: u64,

    status: SpiStatus,
    measuring: bool,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    finished_wall: Option<DateTime<Utc>>,
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAccumulator {
    pub fn new() -> Self {
        StatsAccumulator {
            attempts: 0,
            outcome_counts: BTreeMap::new(),
            connected: Duration::ZERO,
            disconnected: Duration::ZERO,
            last_connect_at: None,
            last_disconnect_at: None,
            disconnects: 0,
            reconnects: 0,
            status: SpiStatus::Unpaired,
            measuring: false,
            started_at: None,
            ended_at: None,
            started_wall: None,
            finished_wall: None,
        }
    }

    /// Zeroes every counter and starts measuring from `now`, with the
    /// interval matching `status` open.
    pub fn reset(&mut self, status: SpiStatus, now: Instant, wall: DateTime<Utc>) {
        *self = StatsAccumulator::new();
        self.status = status;
        self.measuring = true;
        self.last_connect_at = Some(now);
        self.last_disconnect_at = Some(now);
        self.started_at = Some(now);
        self.started_wall = Some(wall);
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring
    }

    pub fn status(&self) -> SpiStatus {
        self.status
    }

    /// Accounts for a status notification observed at `now`.
    ///
    /// Ignored outside a run and when `new_status` equals the status already
    /// recorded.
    pub fn record_status_transition(&mut self, new_status: SpiStatus, now: Instant) {
        if !self.measuring || new_status == self.status {
            return;
        }

        let previous = self.status;
        match new_status {
            SpiStatus::PairedConnected => {
                if previous == SpiStatus::PairedConnecting {
                    self.disconnected += since(self.last_disconnect_at, now);
                }
                self.last_connect_at = Some(now);
                self.reconnects += 1;
            }
            SpiStatus::PairedConnecting => {
                if previous == SpiStatus::PairedConnected {
                    self.connected += since(self.last_connect_at, now);
                    self.disconnects += 1;
                }
                self.last_disconnect_at = Some(now);
            }
            SpiStatus::Unpaired => self.flush_open_interval(now),
        }
        self.status = new_status;
    }

    /// Counts one initiated purchase.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Counts one finished attempt. The caller records each attempt at most
    /// once.
    pub fn record_outcome(&mut self, kind: OutcomeKind) {
        *self.outcome_counts.entry(kind).or_insert(0) += 1;
    }

    /// Flushes the open interval and closes the run.
    ///
    /// Only the first call after a `reset` has any effect.
    pub fn finalize(&mut self, now: Instant, wall: DateTime<Utc>) {
        if !self.measuring {
            return;
        }
        self.flush_open_interval(now);
        self.measuring = false;
        self.ended_at = Some(now);
        self.finished_wall = Some(wall);
    }

    /// Copy of the closed intervals and counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts,
            outcome_counts: self.outcome_counts.clone(),
            connected: self.connected,
            disconnected: self.disconnected,
            disconnects: self.disconnects,
            reconnects: self.reconnects,
            measuring: self.measuring,
            elapsed: match (self.started_at, self.ended_at) {
                (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
                _ => None,
            },
            started_at: self.started_wall,
            finished_at: self.finished_wall,
        }
    }

    /// Like [`snapshot`](Self::snapshot), but with the still-open interval
    /// counted up to `now`. Does not mutate.
    pub fn snapshot_at(&self, now: Instant) -> StatsSnapshot {
        let mut live = self.clone();
        if live.measuring {
            live.flush_open_interval(now);
        }
        let mut snap = live.snapshot();
        if self.measuring {
            snap.elapsed = self.started_at.map(|start| now.saturating_duration_since(start));
        }
        snap
    }

    fn flush_open_interval(&mut self, now: Instant) {
        match self.status {
            SpiStatus::PairedConnected => {
                self.connected += since(self.last_connect_at, now);
                self.last_connect_at = Some(now);
            }
            SpiStatus::PairedConnecting => {
                self.disconnected += since(self.last_disconnect_at, now);
                self.last_disconnect_at = Some(now);
            }
            SpiStatus::Unpaired => {}
        }
    }
}

fn since(mark: Option<Instant>, now: Instant) -> Duration {
    mark.map(|at| now.saturating_duration_since(at))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn started(status: SpiStatus) -> (StatsAccumulator, Instant) {
        let t0 = Instant::now();
        let mut stats = StatsAccumulator::new();
        stats.reset(status, t0, Utc::now());
        (stats, t0)
    }

    #[test]
    fn test_connected_connecting_connected() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);

        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(5));
        stats.record_status_transition(SpiStatus::PairedConnected, t0 + secs(8));

        let snap = stats.snapshot();
        assert_eq!(snap.disconnects, 1);
        assert_eq!(snap.reconnects, 1);
        assert_eq!(snap.connected, secs(5));
        assert_eq!(snap.disconnected, secs(3));
    }

    #[test]
    fn test_duplicate_status_is_not_double_counted() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);

        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(1));
        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(2));
        stats.record_status_transition(SpiStatus::PairedConnected, t0 + secs(4));
        stats.record_status_transition(SpiStatus::PairedConnected, t0 + secs(5));

        let snap = stats.snapshot();
        assert_eq!(snap.disconnects, 1);
        assert_eq!(snap.reconnects, 1);
        assert_eq!(snap.disconnected, secs(3));
    }

    #[test]
    fn test_finalize_conserves_duration() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);

        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(7));
        stats.record_status_transition(SpiStatus::PairedConnected, t0 + secs(9));
        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(20));
        stats.finalize(t0 + secs(30), Utc::now());

        let snap = stats.snapshot();
        assert_eq!(snap.connected, secs(7 + 11));
        assert_eq!(snap.disconnected, secs(2 + 10));
        assert_eq!(snap.connected + snap.disconnected, secs(30));
        assert_eq!(snap.elapsed, Some(secs(30)));
        assert!(!snap.measuring);
    }

    #[test]
    fn test_finalize_only_once() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);

        stats.finalize(t0 + secs(10), Utc::now());
        stats.finalize(t0 + secs(50), Utc::now());

        let snap = stats.snapshot();
        assert_eq!(snap.connected, secs(10));
        assert_eq!(snap.elapsed, Some(secs(10)));
    }

    #[test]
    fn test_transitions_outside_a_run_are_ignored() {
        let t0 = Instant::now();
        let mut stats = StatsAccumulator::new();
        stats.record_status_transition(SpiStatus::PairedConnected, t0);
        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(3));
        assert_eq!(stats.snapshot(), StatsSnapshot::default());

        stats.reset(SpiStatus::PairedConnected, t0, Utc::now());
        stats.finalize(t0 + secs(1), Utc::now());
        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(2));
        assert_eq!(stats.snapshot().disconnects, 0);
    }

    #[test]
    fn test_unpaired_time_accrues_nowhere() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);

        stats.record_status_transition(SpiStatus::Unpaired, t0 + secs(4));
        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(10));
        stats.record_status_transition(SpiStatus::PairedConnected, t0 + secs(12));
        stats.finalize(t0 + secs(15), Utc::now());

        let snap = stats.snapshot();
        assert_eq!(snap.connected, secs(4 + 3));
        assert_eq!(snap.disconnected, secs(2));
        assert_eq!(snap.disconnects, 0);
        assert_eq!(snap.reconnects, 1);
        assert_eq!(snap.elapsed, Some(secs(15)));
    }

    #[test]
    fn test_outcome_conservation() {
        let (mut stats, _) = started(SpiStatus::PairedConnected);

        for kind in [OutcomeKind::Success, OutcomeKind::Success, OutcomeKind::Failed] {
            stats.record_attempt();
            assert_eq!(stats.snapshot().in_flight(), 1);
            stats.record_outcome(kind);
        }
        stats.record_attempt();
        stats.record_outcome(OutcomeKind::Rejected);

        let snap = stats.snapshot();
        assert_eq!(snap.attempts, 4);
        assert_eq!(snap.count(OutcomeKind::Success), 2);
        assert_eq!(snap.count(OutcomeKind::Failed), 1);
        assert_eq!(snap.count(OutcomeKind::Rejected), 1);
        assert_eq!(snap.count(OutcomeKind::Unknown), 0);
        assert_eq!(snap.outcomes_total(), snap.attempts);
    }

    #[test]
    fn test_reset_zeroes_previous_run() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);
        stats.record_attempt();
        stats.record_outcome(OutcomeKind::Failed);
        stats.finalize(t0 + secs(3), Utc::now());

        stats.reset(SpiStatus::PairedConnecting, t0 + secs(5), Utc::now());
        let snap = stats.snapshot();
        assert_eq!(snap.attempts, 0);
        assert!(snap.outcome_counts.is_empty());
        assert_eq!(snap.connected, Duration::ZERO);
        assert!(snap.measuring);
    }

    #[test]
    fn test_snapshot_at_includes_open_interval() {
        let (mut stats, t0) = started(SpiStatus::PairedConnected);
        stats.record_status_transition(SpiStatus::PairedConnecting, t0 + secs(2));

        let live = stats.snapshot_at(t0 + secs(5));
        assert_eq!(live.connected, secs(2));
        assert_eq!(live.disconnected, secs(3));
        assert_eq!(live.elapsed, Some(secs(5)));

        // The accumulator itself is untouched.
        assert_eq!(stats.snapshot().disconnected, Duration::ZERO);
    }

    #[test]
    fn test_outcome_from_success_state() {
        assert_eq!(OutcomeKind::from(SuccessState::Success), OutcomeKind::Success);
        assert_eq!(OutcomeKind::from(SuccessState::Failed), OutcomeKind::Failed);
        assert_eq!(OutcomeKind::from(SuccessState::Unknown), OutcomeKind::Unknown);
    }

    #[test]
    fn test_snapshot_serializes_as_json() {
        let (mut stats, _) = started(SpiStatus::PairedConnected);
        stats.record_attempt();
        stats.record_outcome(OutcomeKind::Success);

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["outcome_counts"]["success"], 1);
    }
}
