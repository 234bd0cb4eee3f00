//! # Engine Error Types
//!
//! The one error type callers of [`LedgerEngine`](crate::LedgerEngine) see.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally                                  │
//! │                                                                         │
//! │  validate_*() ── ValidationErrors ─────────────┐                        │
//! │                                                │                        │
//! │  invariants ──── CoreError ────────────────────┤                        │
//! │                                                ▼                        │
//! │  LedgerStore ─── DbError ── UniqueViolation ─► EngineError ─► adapter   │
//! │                     │       NotFound           │                        │
//! │                     └────── everything else ───┤ code()         "..."   │
//! │                             (Storage)          │ status_class() 4xx/5xx │
//! │  RequestContext ── deadline ── Timeout ────────┤ is_retryable()         │
//! │                 └─ cancel ──── Cancelled ──────┘ body() → JSON          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! [`ErrorBody`] is what an adapter puts on the wire:
//! ```json
//! {
//!   "code": "INSUFFICIENT_STOCK",
//!   "message": "Insufficient stock for p-1: available 70, requested 80",
//!   "retryable": false,
//!   "fields": []
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

use tally_core::{CoreError, Money, ValidationError, ValidationErrors};
use tally_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Every way an engine operation can fail.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Rejected before any state is touched
    // =========================================================================
    /// Static validation failed. Carries every violation, in field order.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A referenced aggregate or event does not exist for the tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // Rejected under the hold
    // =========================================================================
    /// Product missing, owned by another tenant, or inactive.
    #[error("Invalid product: {product_id}")]
    InvalidProduct { product_id: String },

    /// Account missing, owned by another tenant, or inactive.
    #[error("Invalid account: {account_id}")]
    InvalidAccount { account_id: String },

    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Unbalanced entry: debits {debit} != credits {credit}")]
    UnbalancedEntry { debit: Money, credit: Money },

    /// A storage uniqueness constraint fired: a duplicate code, or a second
    /// reversal of the same event.
    #[error("Duplicate {field}: '{value}'")]
    DuplicateKey { field: String, value: String },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Storage failure: {0}")]
    Storage(#[source] DbError),

    /// The deadline passed before the scope committed.
    #[error("Deadline exceeded before commit")]
    Timeout,

    /// The caller cancelled before the scope committed.
    #[error("Request cancelled before commit")]
    Cancelled,
}

/// Transport-neutral severity of an error, with its HTTP equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    BadRequest,
    NotFound,
    Conflict,
    Unprocessable,
    ClientClosed,
    Unavailable,
    GatewayTimeout,
    Internal,
}

impl StatusClass {
    pub fn http_status(&self) -> u16 {
        match self {
            StatusClass::BadRequest => 400,
            StatusClass::NotFound => 404,
            StatusClass::Conflict => 409,
            StatusClass::Unprocessable => 422,
            StatusClass::ClientClosed => 499,
            StatusClass::Internal => 500,
            StatusClass::Unavailable => 503,
            StatusClass::GatewayTimeout => 504,
        }
    }

    /// True for the 4xx-equivalents.
    pub fn is_client_error(&self) -> bool {
        self.http_status() < 500
    }
}

impl EngineError {
    /// Machine-readable code for adapters.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::InvalidProduct { .. } => "INVALID_PRODUCT",
            EngineError::InvalidAccount { .. } => "INVALID_ACCOUNT",
            EngineError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            EngineError::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            EngineError::DuplicateKey { .. } => "DUPLICATE_KEY",
            EngineError::Storage(_) => "STORAGE",
            EngineError::Timeout => "TIMEOUT",
            EngineError::Cancelled => "CANCELLED",
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            EngineError::Validation(_) => StatusClass::BadRequest,
            EngineError::NotFound { .. } => StatusClass::NotFound,
            EngineError::DuplicateKey { .. } => StatusClass::Conflict,
            EngineError::InvalidProduct { .. }
            | EngineError::InvalidAccount { .. }
            | EngineError::InsufficientStock { .. }
            | EngineError::UnbalancedEntry { .. } => StatusClass::Unprocessable,
            EngineError::Cancelled => StatusClass::ClientClosed,
            EngineError::Timeout => StatusClass::GatewayTimeout,
            EngineError::Storage(e) if e.is_retryable() => StatusClass::Unavailable,
            EngineError::Storage(_) => StatusClass::Internal,
        }
    }

    /// True when the same request may succeed if sent again later. The
    /// engine never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout => true,
            EngineError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Wire representation. Storage details are logged, not exposed.
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            EngineError::Storage(_) => "Storage operation failed".to_string(),
            other => other.to_string(),
        };

        let fields = match self {
            EngineError::Validation(errors) => errors
                .errors()
                .iter()
                .map(|e| FieldError {
                    field: e.field().to_string(),
                    message: e.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };

        ErrorBody {
            code: self.code(),
            message,
            retryable: self.is_retryable(),
            fields,
        }
    }

    pub(crate) fn required(field: &str) -> Self {
        EngineError::Validation(
            ValidationError::Required {
                field: field.to_string(),
            }
            .into(),
        )
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Serializable error for adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationErrors> for EngineError {
    fn from(errors: ValidationErrors) -> Self {
        EngineError::Validation(errors)
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidProduct { product_id } => EngineError::InvalidProduct { product_id },
            CoreError::InvalidAccount { account_id } => EngineError::InvalidAccount { account_id },
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => EngineError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::UnbalancedEntry { debit, credit } => {
                EngineError::UnbalancedEntry { debit, credit }
            }
            // Only reachable with amounts near i64::MAX, so it is the
            // request that is wrong.
            CoreError::AmountOverflow { context } => EngineError::Validation(
                ValidationError::InvalidFormat {
                    field: context,
                    reason: "arithmetic overflow".to_string(),
                }
                .into(),
            ),
            CoreError::Validation(errors) => EngineError::Validation(errors),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation { field, value } => EngineError::DuplicateKey { field, value },
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Storage(other),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
