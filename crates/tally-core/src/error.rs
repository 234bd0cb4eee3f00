//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                          │
//! │  ├── ValidationError   - One field-level violation                      │
//! │  ├── ValidationErrors  - Ordered, non-empty list of violations          │
//! │  └── CoreError         - Business-rule rejections (invariants)          │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                       │
//! │  └── DbError           - Storage failures                               │
//! │                                                                         │
//! │  tally-engine errors (separate crate)                                   │
//! │  └── EngineError       - What an adapter sees (code + status class)     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                   │
//! │                           DbError ──┴─► EngineError → adapter           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, totals, etc.)
//! 3. Errors are enum variants, never String
//! 4. Validation reports every violation at once, in field order

use std::fmt;

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business-rule rejections.
///
/// Everything except `Validation` is produced by the invariant checker
/// against state read under a hold, so these describe the aggregate as it
/// was at commit time, not at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Product is missing, belongs to another tenant, or is inactive.
    #[error("Invalid product: {product_id}")]
    InvalidProduct { product_id: String },

    /// Account is missing, belongs to another tenant, or is inactive.
    #[error("Invalid account: {account_id}")]
    InvalidAccount { account_id: String },

    /// An outbound movement would drive stock below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// OUT 80 requested
    ///      │
    ///      ▼
    /// Fresh read under hold: quantity_on_hand = 70
    ///      │
    ///      ▼
    /// 70 - 80 < 0 → InsufficientStock { available: 70, requested: 80 }
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Journal entry debits and credits differ.
    #[error("Unbalanced entry: debits {debit} != credits {credit}")]
    UnbalancedEntry { debit: Money, credit: Money },

    /// A sum or balance would leave the i64 range.
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },

    /// Static validation failed.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustNotBeZero { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g. illegal characters in a code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in the allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Value is syntactically valid but contradicts another field.
    #[error("{field} {reason}")]
    Conflict { field: String, reason: String },
}

impl ValidationError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::MustNotBeZero { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. }
            | ValidationError::Conflict { field, .. } => field,
        }
    }
}

/// Ordered, non-empty list of validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Wraps a list of violations. Returns `None` for an empty list so an
    /// empty report can never be mistaken for a rejection.
    pub fn from_vec(errors: Vec<ValidationError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(ValidationErrors(errors))
        }
    }

    /// The individual violations, in the order they were found.
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if any violation concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        ValidationErrors(vec![err])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: 70,
            requested: 80,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p-1: available 70, requested 80"
        );

        let err = CoreError::UnbalancedEntry {
            debit: Money::from_minor(5000),
            credit: Money::from_minor(3000),
        };
        assert_eq!(err.to_string(), "Unbalanced entry: debits 5000 != credits 3000");
    }

    #[test]
    fn test_validation_errors_display_in_order() {
        let errors = ValidationErrors::from_vec(vec![
            ValidationError::Required {
                field: "product_id".to_string(),
            },
            ValidationError::MustNotBeZero {
                field: "quantity".to_string(),
            },
        ])
        .unwrap();

        assert_eq!(
            errors.to_string(),
            "product_id is required; quantity must not be zero"
        );
        assert!(errors.has_field("quantity"));
        assert!(!errors.has_field("note"));
    }

    #[test]
    fn test_empty_list_is_not_an_error() {
        assert!(ValidationErrors::from_vec(Vec::new()).is_none());
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let errors: ValidationErrors = ValidationError::Required {
            field: "code".to_string(),
        }
        .into();
        let core_err: CoreError = errors.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
