//! # Validation Module
//!
//! Input validation for the sync and reconciliation surfaces.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (UI / command layer)                                  │
//! │  └── Basic format checks, immediate user feedback                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite constraints (NOT NULL, UNIQUE, FK)                    │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length accepted for scope keys and entity ids.
const MAX_KEY_LENGTH: usize = 128;

// =============================================================================
// Key Validators
// =============================================================================

/// Validates a scope key (typically a user id partitioning cached state and
/// operation ordering).
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must not exceed 128 characters
pub fn validate_scope_key(key: &str) -> ValidationResult<()> {
    let key = key.trim();

    if key.is_empty() {
        return Err(ValidationError::Required {
            field: "scope_key".to_string(),
        });
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "scope_key".to_string(),
            max: MAX_KEY_LENGTH,
        });
    }

    Ok(())
}

/// Validates an entity id carried by a pending operation.
pub fn validate_entity_id(id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: "entity_id".to_string(),
        });
    }

    if id.len() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "entity_id".to_string(),
            max: MAX_KEY_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates a declared closing amount. A drawer count can be wrong but it
/// cannot be negative.
pub fn validate_declared_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::NegativeAmount {
            field: "declared_closing".to_string(),
            cents: amount.cents(),
        });
    }
    Ok(())
}

/// Validates an opening float amount.
pub fn validate_opening_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::NegativeAmount {
            field: "opening".to_string(),
            cents: amount.cents(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key() {
        assert!(validate_scope_key("user-1").is_ok());
        assert!(validate_scope_key("  ").is_err());
        assert!(validate_scope_key(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_entity_id() {
        assert!(validate_entity_id("sale-123").is_ok());
        assert!(validate_entity_id("").is_err());
    }

    #[test]
    fn test_amounts() {
        assert!(validate_declared_amount(Money::from_cents(0)).is_ok());
        assert!(validate_declared_amount(Money::from_cents(14_000)).is_ok());
        assert_eq!(
            validate_declared_amount(Money::from_cents(-1)),
            Err(ValidationError::NegativeAmount {
                field: "declared_closing".into(),
                cents: -1,
            })
        );
        assert!(validate_opening_amount(Money::from_cents(-100)).is_err());
    }
}
