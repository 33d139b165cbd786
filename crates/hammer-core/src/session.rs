//! # Session State
//!
//! The harness's mirror of one terminal session: who we are (POS id), where
//! the terminal is, the paired secrets, and the last status/flow the SDK
//! reported.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  argv[1] "POS1:10.0.0.5:ENC:HMAC" ──► PersistedSession::parse           │
//! │                                             │                           │
//! │                                             ▼                           │
//! │                                      SessionState::resume               │
//! │                                             │                           │
//! │        secrets notification ──► apply_secrets ──► Persist / Destroy     │
//! │        status notification  ──► apply_status  (Unpaired clears keys)    │
//! │                                             │                           │
//! │                                             ▼                           │
//! │  clean exit ◄── PersistedSession::to_line ◄─ SessionState::persisted    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::{Secrets, SpiFlow, SpiStatus};
use crate::validation::{validate_pos_id, validate_terminal_address};

// =============================================================================
// Session State
// =============================================================================

/// What the console knows about its session.
///
/// `secrets` is only present while `last_known_status` is a paired state,
/// apart from the window between resuming from a persisted line and the
/// SDK's first status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub pos_id: String,
    pub terminal_address: String,
    #[serde(skip)]
    pub secrets: Option<Secrets>,
    pub last_known_status: SpiStatus,
    pub last_known_flow: SpiFlow,
}

/// What to do with key material after a secrets notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretsAction {
    /// New secrets were issued; keep them for the next launch.
    Persist(Secrets),
    /// Secrets were revoked; forget any saved copy.
    Destroy,
}

impl SessionState {
    /// Fresh, unpaired session.
    pub fn new(pos_id: impl Into<String>, terminal_address: impl Into<String>) -> Self {
        SessionState {
            pos_id: pos_id.into(),
            terminal_address: terminal_address.into(),
            secrets: None,
            last_known_status: SpiStatus::Unpaired,
            last_known_flow: SpiFlow::Idle,
        }
    }

    /// Session resumed from a persisted line. No pairing request is implied.
    pub fn resume(persisted: PersistedSession) -> Self {
        SessionState {
            pos_id: persisted.pos_id,
            terminal_address: persisted.terminal_address,
            secrets: Some(persisted.secrets),
            last_known_status: SpiStatus::Unpaired,
            last_known_flow: SpiFlow::Idle,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.secrets.is_some()
    }

    /// Mirrors a status notification. Observing `Unpaired` drops the secrets
    /// immediately.
    ///
    /// Returns true when the status actually changed.
    pub fn apply_status(&mut self, status: SpiStatus) -> bool {
        if status == SpiStatus::Unpaired {
            self.secrets = None;
        }
        let changed = self.last_known_status != status;
        self.last_known_status = status;
        changed
    }

    /// Mirrors a secrets notification (`None` means the terminal revoked
    /// them).
    pub fn apply_secrets(&mut self, secrets: Option<Secrets>) -> SecretsAction {
        match secrets {
            Some(secrets) => {
                self.secrets = Some(secrets.clone());
                SecretsAction::Persist(secrets)
            }
            None => {
                self.secrets = None;
                SecretsAction::Destroy
            }
        }
    }

    pub fn apply_flow(&mut self, flow: SpiFlow) {
        self.last_known_flow = flow;
    }

    /// The line to print at clean exit, if there is anything to persist.
    pub fn persisted(&self) -> Option<PersistedSession> {
        self.secrets.as_ref().map(|secrets| PersistedSession {
            pos_id: self.pos_id.clone(),
            terminal_address: self.terminal_address.clone(),
            secrets: secrets.clone(),
        })
    }
}

// =============================================================================
// Persisted Session Codec
// =============================================================================

/// `posId:terminalAddress:encKey:hmacKey`, the one-line form a paired
/// session survives a restart in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub pos_id: String,
    pub terminal_address: String,
    pub secrets: Secrets,
}

impl PersistedSession {
    /// Parses a persisted line.
    ///
    /// ## Errors
    /// `InvalidPersistedSession` when the line does not have exactly four
    /// non-empty fields, or when the POS id / address fail validation.
    pub fn parse(line: &str) -> CoreResult<Self> {
        let parts: Vec<&str> = line.trim().split(':').collect();
        if parts.len() != 4 {
            return Err(CoreError::InvalidPersistedSession {
                reason: format!("expected 4 ':'-separated fields, found {}", parts.len()),
            });
        }

        if let Some(index) = parts.iter().position(|p| p.is_empty()) {
            return Err(CoreError::InvalidPersistedSession {
                reason: format!("field {} is empty", index + 1),
            });
        }

        validate_pos_id(parts[0])?;
        validate_terminal_address(parts[1])?;

        Ok(PersistedSession {
            pos_id: parts[0].to_string(),
            terminal_address: parts[1].to_string(),
            secrets: Secrets::new(parts[2], parts[3]),
        })
    }

    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.pos_id, self.terminal_address, self.secrets.enc_key, self.secrets.hmac_key
        )
    }
}

impl std::str::FromStr for PersistedSession {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PersistedSession::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_persisted_line() {
        let persisted = PersistedSession::parse("POS1:10.0.0.5:ENCKEY:HMACKEY").unwrap();
        let state = SessionState::resume(persisted);

        assert_eq!(state.pos_id, "POS1");
        assert_eq!(state.terminal_address, "10.0.0.5");
        let secrets = state.secrets.as_ref().unwrap();
        assert_eq!(secrets.enc_key, "ENCKEY");
        assert_eq!(secrets.hmac_key, "HMACKEY");
        assert_eq!(state.last_known_status, SpiStatus::Unpaired);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for line in ["", "POS1:10.0.0.5:ENCKEY", "POS1:10.0.0.5:ENC:HMAC:EXTRA", "POS1::ENC:HMAC"] {
            assert!(
                matches!(
                    PersistedSession::parse(line),
                    Err(CoreError::InvalidPersistedSession { .. })
                ),
                "line {:?} should be rejected",
                line
            );
        }

        assert!(matches!(
            PersistedSession::parse("POS-1:10.0.0.5:ENC:HMAC"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_persisted_line_is_stable() {
        let line = "POS1:10.0.0.5:ENCKEY:HMACKEY";
        let persisted: PersistedSession = line.parse().unwrap();
        assert_eq!(persisted.to_line(), line);
    }

    #[test]
    fn test_unpaired_status_clears_secrets() {
        let mut state = SessionState::new("POS1", "10.0.0.5");
        state.apply_secrets(Some(Secrets::new("E", "H")));
        assert!(state.apply_status(SpiStatus::PairedConnected));
        assert!(state.is_paired());

        assert!(state.apply_status(SpiStatus::Unpaired));
        assert!(!state.is_paired());
        assert!(state.persisted().is_none());
    }

    #[test]
    fn test_apply_secrets_actions() {
        let mut state = SessionState::new("POS1", "10.0.0.5");

        let action = state.apply_secrets(Some(Secrets::new("E", "H")));
        assert_eq!(action, SecretsAction::Persist(Secrets::new("E", "H")));
        assert_eq!(
            state.persisted().map(|p| p.to_line()),
            Some("POS1:10.0.0.5:E:H".to_string())
        );

        assert_eq!(state.apply_secrets(None), SecretsAction::Destroy);
        assert!(state.secrets.is_none());
    }

    #[test]
    fn test_repeated_status_reports_no_change() {
        let mut state = SessionState::new("POS1", "10.0.0.5");
        assert!(state.apply_status(SpiStatus::PairedConnecting));
        assert!(!state.apply_status(SpiStatus::PairedConnecting));
    }
}
