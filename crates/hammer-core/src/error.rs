//! # Error Types
//!
//! Domain-specific error types for hammer-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hammer-core errors (this file)                                         │
//! │  ├── CoreError        - Session/telemetry domain errors                 │
//! │  └── ValidationError  - Operator input validation failures              │
//! │                                                                         │
//! │  hammer-harness errors (separate crate)                                 │
//! │  └── HarnessError     - Config, stalled transactions, SDK refusals      │
//! │                                                                         │
//! │  console errors (in app)                                                │
//! │  └── ConsoleError     - What the operator sees                          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → HarnessError → ConsoleError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Session and telemetry domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The persisted session line could not be decoded.
    ///
    /// ## Expected Format
    /// ```text
    /// posId:terminalAddress:encKey:hmacKey
    /// POS1:10.0.0.5:ENCKEY:HMACKEY
    /// ```
    #[error("Invalid persisted session: {reason}")]
    InvalidPersistedSession { reason: String },

    /// Gap bounds would violate `0 < min <= max`.
    #[error("Invalid gap range: min {min_ms}ms, max {max_ms}ms")]
    InvalidGapRange { min_ms: u64, max_ms: u64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
/// The console reports them and leaves all state unchanged.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., non-numeric gap, colon in an address).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidGapRange {
            min_ms: 30_000,
            max_ms: 20_000,
        };
        assert_eq!(err.to_string(), "Invalid gap range: min 30000ms, max 20000ms");

        let err = ValidationError::MustBePositive {
            field: "min_gap".to_string(),
        };
        assert_eq!(err.to_string(), "min_gap must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "pos_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
