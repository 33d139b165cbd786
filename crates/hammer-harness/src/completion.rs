//! # Transaction Completion Signal
//!
//! How the stress driver learns that its transaction finished.
//!
//! ## Wait Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  projector ── finished TxFlowState ──► watch channel ──┐                │
//! │                                                         │               │
//! │  driver: wait_for_completion(request_id)                ▼               │
//! │    ├── signal carries a finished state for request_id ─► done           │
//! │    ├── every recheck tick: SDK snapshot finished for id ─► done         │
//! │    └── timeout (if configured) ─► StalledTransaction                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The watch channel keeps the latest finished state, so a completion that
//! lands before the driver starts waiting is still seen.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use hammer_core::{SpiFlow, TransactionFlowState};

use crate::error::{HarnessError, HarnessResult};
use crate::sdk::TerminalSdk;

/// Publisher side, owned by the projector.
#[derive(Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<Option<TransactionFlowState>>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        CompletionSignal { tx: Arc::new(tx) }
    }

    /// Publishes `state` if it is finished. Unfinished states are ignored.
    pub fn publish(&self, state: &TransactionFlowState) {
        if state.finished {
            self.tx.send_replace(Some(state.clone()));
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TransactionFlowState>> {
        self.tx.subscribe()
    }
}

/// How long and how often to wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub recheck: Duration,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Waits until the transaction `request_id` has finished.
///
/// ## Errors
/// `StalledTransaction` once `policy.timeout` elapses without a completion.
pub async fn wait_for_completion(
    completions: &mut watch::Receiver<Option<TransactionFlowState>>,
    sdk: &Arc<dyn TerminalSdk>,
    request_id: &str,
    policy: WaitPolicy,
) -> HarnessResult<TransactionFlowState> {
    let started = Instant::now();
    let expiry = async move {
        match policy.timeout {
            Some(timeout) => sleep_until(started + timeout).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expiry);

    let mut recheck = interval(policy.recheck);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut signal_open = true;

    loop {
        {
            let latest = completions.borrow_and_update();
            if let Some(state) = (*latest).as_ref().filter(|s| s.is_finished_for(request_id)) {
                return Ok(state.clone());
            }
        }

        tokio::select! {
            changed = completions.changed(), if signal_open => {
                if changed.is_err() {
                    warn!(request_id = %request_id, "Completion signal closed, relying on snapshot re-checks");
                    signal_open = false;
                }
            }
            _ = recheck.tick() => {
                let snapshot = sdk.current_tx_flow_state();
                if sdk.current_flow() == SpiFlow::Transaction && snapshot.is_finished_for(request_id) {
                    debug!(request_id = %request_id, "Completion found by snapshot re-check");
                    return Ok(snapshot);
                }
            }
            _ = &mut expiry => {
                let waited_secs = started.elapsed().as_secs();
                return Err(HarnessError::StalledTransaction {
                    request_id: request_id.to_string(),
                    waited_secs,
                });
            }
        }
    }
}
