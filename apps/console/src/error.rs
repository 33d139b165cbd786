//! # Console Error Type
//!
//! Unified error type for console commands.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  operator line ──► parse ──► UnknownCommand / NotAvailable /            │
//! │                      │       MissingArgument                            │
//! │                      ▼                                                  │
//! │                  dispatch ──► HarnessError / CoreError ──► ConsoleError │
//! │                      │                                         │        │
//! │                      ▼                                         ▼        │
//! │                   output                         "# <message>" printed  │
//! │                                                  state left unchanged   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hammer_core::CoreError;
use hammer_harness::HarnessError;

use crate::console::Profile;

/// Result type alias for console operations.
pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Error shown to the operator.
#[derive(Debug, Clone)]
pub struct ConsoleError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable message for the console
    pub message: String,
}

/// Error codes for console failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The line is not a command.
    UnknownCommand,

    /// The command exists, but not in this console.
    NotAvailable,

    /// `name:` form without the argument.
    MissingArgument,

    /// The argument failed validation.
    InvalidInput,

    /// The terminal refused the request in its current state.
    Refused,

    /// A transaction did not finish in time.
    Stalled,

    /// Configuration could not be loaded.
    Config,

    /// Reading the operator's input or writing output failed.
    Io,

    Internal,
}

impl ConsoleError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ConsoleError {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_command() -> Self {
        ConsoleError::new(ErrorCode::UnknownCommand, "I don't understand. Sorry.")
    }

    pub fn not_available(command: &str, profile: Profile) -> Self {
        ConsoleError::new(
            ErrorCode::NotAvailable,
            format!("[{}] is not available in {}.", command, profile.app_name()),
        )
    }

    pub fn missing_argument(command: &str, example: &str) -> Self {
        ConsoleError::new(
            ErrorCode::MissingArgument,
            format!("[{}] needs a value, e.g. [{}:{}].", command, command, example),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        ConsoleError::new(ErrorCode::Config, message)
    }
}

/// Converts harness errors to console errors.
impl From<HarnessError> for ConsoleError {
    fn from(err: HarnessError) -> Self {
        match err {
            _ if err.is_config_error() => ConsoleError::config(err.to_string()),
            HarnessError::Rejected { .. } | HarnessError::SdkRefused { .. } => {
                ConsoleError::new(ErrorCode::Refused, err.to_string())
            }
            HarnessError::StalledTransaction { .. } => {
                ConsoleError::new(ErrorCode::Stalled, err.to_string())
            }
            HarnessError::ChannelError(e) => {
                tracing::error!("Session channel failed: {}", e);
                ConsoleError::new(ErrorCode::Internal, "Internal error, see the log")
            }
            HarnessError::Core(e) => e.into(),
            _ => ConsoleError::new(ErrorCode::Internal, err.to_string()),
        }
    }
}

/// Converts core errors to console errors.
impl From<CoreError> for ConsoleError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidPersistedSession { .. } => ConsoleError::config(err.to_string()),
            CoreError::InvalidGapRange { .. } | CoreError::Validation(_) => {
                ConsoleError::new(ErrorCode::InvalidInput, err.to_string())
            }
        }
    }
}

impl From<std::io::Error> for ConsoleError {
    fn from(err: std::io::Error) -> Self {
        ConsoleError::new(ErrorCode::Io, err.to_string())
    }
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ConsoleError {}
