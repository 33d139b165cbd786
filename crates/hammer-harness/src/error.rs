//! # Harness Error Types
//!
//! Error types for session, driver and configuration operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Harness Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │  Configuration  │  │   Terminal SDK  │  │     Runtime             │  │
//! │  │                 │  │                 │  │                         │  │
//! │  │  InvalidConfig  │  │  Rejected       │  │  ChannelError           │  │
//! │  │  ConfigLoad...  │  │  SdkRefused     │  │                         │  │
//! │  │                 │  │  Stalled...     │  │                         │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  Core(CoreError): persisted session, gap range, validation      │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hammer_core::CoreError;
use thiserror::Error;

/// Result type alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Everything that can go wrong above the pure core.
#[derive(Debug, Error)]
pub enum HarnessError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid harness configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Terminal Errors
    // =========================================================================
    /// The SDK answered an initiate request with `initiated = false`.
    #[error("Could not initiate: {message}")]
    Rejected { message: String },

    /// A setter or request the SDK refused in its current state.
    #[error("Terminal refused to {action}")]
    SdkRefused { action: String },

    /// No completion arrived for an initiated transaction in time.
    #[error("Transaction {request_id} did not finish within {waited_secs}s")]
    StalledTransaction { request_id: String, waited_secs: u64 },

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    // =========================================================================
    // Core Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<hammer_core::ValidationError> for HarnessError {
    fn from(err: hammer_core::ValidationError) -> Self {
        HarnessError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl HarnessError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            HarnessError::InvalidConfig(_) | HarnessError::ConfigLoadFailed(_)
        )
    }

    /// Returns true if the operator caused it and can fix it by retyping.
    ///
    /// These leave every piece of state unchanged.
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            HarnessError::Core(CoreError::Validation(_))
                | HarnessError::Core(CoreError::InvalidGapRange { .. })
                | HarnessError::SdkRefused { .. }
                | HarnessError::Rejected { .. }
        )
    }

    /// Returns true if a transaction's outcome is unknown and the operator
    /// must check the terminal.
    pub fn needs_terminal_check(&self) -> bool {
        matches!(self, HarnessError::StalledTransaction { .. })
    }
}
