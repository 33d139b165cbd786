//! # Validation Module
//!
//! Operator input validation for the console commands.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Console parser                                                │
//! │  ├── Command name and `:` argument split                                │
//! │  └── Unknown command → "I don't understand"                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── POS id / terminal address format                                   │
//! │  └── Gap seconds, amounts                                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Terminal SDK                                                  │
//! │  └── set_pos_id / set_terminal_address may still refuse (bool)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use hammer_core::validation::{parse_gap_secs, validate_pos_id};
//!
//! assert!(validate_pos_id("HAMMERPOS").is_ok());
//! assert_eq!(parse_gap_secs("min_gap", "10").unwrap(), 10_000);
//! assert!(parse_gap_secs("min_gap", "ten").is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_POS_ID_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest gap the console accepts, in seconds (one hour).
pub const MAX_GAP_SECS: u64 = 3600;

/// Longest terminal address accepted (DNS name limit).
const MAX_ADDRESS_LEN: usize = 253;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a POS identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most 16 characters
/// - Letters and digits only
pub fn validate_pos_id(pos_id: &str) -> ValidationResult<()> {
    let pos_id = pos_id.trim();

    if pos_id.is_empty() {
        return Err(ValidationError::Required {
            field: "pos_id".to_string(),
        });
    }

    if pos_id.len() > MAX_POS_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "pos_id".to_string(),
            max: MAX_POS_ID_LEN,
        });
    }

    if !pos_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "pos_id".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a terminal network address (host name or IPv4, optional port
/// is not supported).
///
/// ## Rules
/// - Must not be empty
/// - No `:` and no whitespace, since the persisted session line is
///   colon-delimited
pub fn validate_terminal_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "eftpos_address".to_string(),
        });
    }

    if address.len() > MAX_ADDRESS_LEN {
        return Err(ValidationError::TooLong {
            field: "eftpos_address".to_string(),
            max: MAX_ADDRESS_LEN,
        });
    }

    if address.contains(':') || address.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "eftpos_address".to_string(),
            reason: "must not contain ':' or spaces".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Parses a gap given in whole seconds and returns it in milliseconds.
///
/// ## Rules
/// - Whole number of seconds
/// - Between 1 and [`MAX_GAP_SECS`]
pub fn parse_gap_secs(field: &str, raw: &str) -> ValidationResult<u64> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let secs: i64 = raw.parse().map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a whole number of seconds", raw),
    })?;

    if secs <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if secs as u64 > MAX_GAP_SECS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_GAP_SECS as i64,
        });
    }

    Ok(secs as u64 * 1000)
}

/// Validates a transaction amount in cents.
pub fn validate_amount_cents(amount_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount_cents".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pos_id() {
        assert!(validate_pos_id("HAMMERPOS").is_ok());
        assert!(validate_pos_id("POS1").is_ok());
        assert!(matches!(
            validate_pos_id("  "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_pos_id("ABCDEFGHIJKLMNOPQ"),
            Err(ValidationError::TooLong { max: 16, .. })
        ));
        assert!(matches!(
            validate_pos_id("POS-1"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_terminal_address() {
        assert!(validate_terminal_address("10.161.104.104").is_ok());
        assert!(validate_terminal_address("eftpos.local").is_ok());
        assert!(validate_terminal_address("").is_err());
        assert!(validate_terminal_address("10.0.0.5:8080").is_err());
        assert!(validate_terminal_address("10.0.0 .5").is_err());
    }

    #[test]
    fn test_parse_gap_secs() {
        assert_eq!(parse_gap_secs("min_gap", "10").unwrap(), 10_000);
        assert_eq!(parse_gap_secs("max_gap", " 20 ").unwrap(), 20_000);
        assert!(matches!(
            parse_gap_secs("min_gap", "0"),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            parse_gap_secs("min_gap", "-3"),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            parse_gap_secs("min_gap", "1.5"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            parse_gap_secs("min_gap", ""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            parse_gap_secs("max_gap", "3601"),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount_cents(1000).is_ok());
        assert!(validate_amount_cents(0).is_err());
        assert!(validate_amount_cents(-1).is_err());
    }
}
