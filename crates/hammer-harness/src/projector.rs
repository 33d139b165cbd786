//! # Event Projector
//!
//! Consumes the SDK's notifications on a single task and projects them onto
//! the session state, the telemetry and the completion signal.
//!
//! ## Projection Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EventProjector                                   │
//! │                                                                         │
//! │  SpiEvent               SessionState        Telemetry     Side effect   │
//! │  ─────────────────────  ──────────────────  ────────────  ───────────   │
//! │  StatusChanged(s)       last_known_status   transition    render        │
//! │                         (Unpaired: drop                                 │
//! │                          secrets)                                       │
//! │  PairingFlowChanged     last_known_flow     -             render        │
//! │  SecretsChanged(opt)    secrets             -             persist /     │
//! │                                                           destroy,      │
//! │                                                           render        │
//! │  TxFlowChanged(tx)      last_known_flow     -             completion    │
//! │                                                           (finished),   │
//! │                                                           render        │
//! │                                                                         │
//! │  Locks are held only for the update itself, never across an await on    │
//! │  the driver or the console.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Outcomes are not recorded here; the driver records its own attempt's
//! outcome exactly once.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use hammer_core::{SecretsAction, SessionState};

use crate::completion::CompletionSignal;
use crate::error::{HarnessError, HarnessResult};
use crate::sdk::{SpiEvent, SpiEventReceiver, TerminalSdk};
use crate::telemetry::{clock, SharedTelemetry};

// =============================================================================
// Emitter Trait
// =============================================================================

/// Why a re-render was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderReason {
    Status,
    PairingFlow,
    Secrets,
    TxFlow,
}

/// Side effects of projection (implemented by the console).
pub trait ProjectionEmitter: Send + Sync {
    /// The projected view changed and should be redrawn.
    fn emit_render(&self, reason: RenderReason);

    /// Secrets were issued or revoked.
    fn emit_secrets(&self, action: &SecretsAction);
}

/// No-op emitter for testing.
pub struct NoOpEmitter;

impl ProjectionEmitter for NoOpEmitter {
    fn emit_render(&self, _reason: RenderReason) {}
    fn emit_secrets(&self, _action: &SecretsAction) {}
}

// =============================================================================
// Projector
// =============================================================================

/// The SDK delivery context.
pub struct EventProjector {
    sdk: Arc<dyn TerminalSdk>,
    state: Arc<RwLock<SessionState>>,
    telemetry: SharedTelemetry,
    completion: CompletionSignal,
    emitter: Arc<dyn ProjectionEmitter>,
}

/// Handle for stopping a running projector.
pub struct ProjectorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ProjectorHandle {
    /// Stops the projector and waits for its task to end.
    pub async fn shutdown(self) -> HarnessResult<()> {
        // The task may already have ended because the SDK closed its channel.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| HarnessError::ChannelError(format!("Projector task failed: {}", e)))
    }
}

impl EventProjector {
    pub fn new(
        sdk: Arc<dyn TerminalSdk>,
        state: Arc<RwLock<SessionState>>,
        telemetry: SharedTelemetry,
        completion: CompletionSignal,
        emitter: Arc<dyn ProjectionEmitter>,
    ) -> Self {
        EventProjector {
            sdk,
            state,
            telemetry,
            completion,
            emitter,
        }
    }

    /// Spawns the delivery loop over `events`.
    pub fn spawn(self, events: SpiEventReceiver) -> ProjectorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(events, shutdown_rx));
        ProjectorHandle { shutdown_tx, task }
    }

    async fn run(self, mut events: SpiEventReceiver, mut shutdown_rx: mpsc::Receiver<()>) {
        debug!("Event projector started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.apply(event).await,
                    None => {
                        info!("Terminal event channel closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    debug!("Event projector received shutdown");
                    break;
                }
            }
        }

        debug!("Event projector stopped");
    }

    /// Applies one notification.
    pub async fn apply(&self, event: SpiEvent) {
        trace!(kind = event.kind(), "SDK event");
        match event {
            SpiEvent::StatusChanged(status) => {
                let now = clock::now();
                let changed = self.state.write().await.apply_status(status);
                self.telemetry.lock().await.stats.record_status_transition(status, now);

                if changed {
                    info!(status = %status, "Terminal status changed");
                }
                self.emitter.emit_render(RenderReason::Status);
            }

            SpiEvent::PairingFlowChanged(pairing) => {
                debug!(
                    finished = pairing.finished,
                    successful = pairing.successful,
                    message = %pairing.message,
                    "Pairing flow changed"
                );
                self.state.write().await.apply_flow(self.sdk.current_flow());
                self.emitter.emit_render(RenderReason::PairingFlow);
            }

            SpiEvent::SecretsChanged(secrets) => {
                let action = self.state.write().await.apply_secrets(secrets);
                match &action {
                    SecretsAction::Persist(_) => info!("Received terminal secrets"),
                    SecretsAction::Destroy => warn!("Terminal secrets revoked"),
                }
                self.emitter.emit_secrets(&action);
                self.emitter.emit_render(RenderReason::Secrets);
            }

            SpiEvent::TxFlowChanged(tx) => {
                self.state.write().await.apply_flow(self.sdk.current_flow());
                if tx.finished {
                    debug!(request_id = %tx.id, success = %tx.success, "Transaction finished");
                    self.completion.publish(&tx);
                }
                self.emitter.emit_render(RenderReason::TxFlow);
            }
        }
    }
}
