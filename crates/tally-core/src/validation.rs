//! # Validation Module
//!
//! Static checks on incoming requests. Nothing here reads storage.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (before any hold is taken)                        │
//! │  ├── Required fields, lengths, code format                              │
//! │  ├── Sign / zero rules on quantities and amounts                        │
//! │  └── Every violation collected, in field order                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Invariant checker (under the hold, fresh state)               │
//! │  ├── Non-negative stock                                                 │
//! │  ├── Balanced entries                                                   │
//! │  └── Active, same-tenant aggregates                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK constraints                                                  │
//! │  ├── UNIQUE constraints (codes, reversal links)                         │
//! │  └── Append-only triggers on event tables                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation is idempotent and side-effect free, so it is safe to run
//! speculatively before a scope is opened.
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::validate_movement;
//! use tally_core::{MovementRequest, MovementType};
//!
//! let ok = MovementRequest::new("p-1", MovementType::In, 5, "clerk");
//! assert!(validate_movement(&ok).is_ok());
//!
//! let bad = MovementRequest::new("", MovementType::Out, 0, "clerk");
//! let errors = validate_movement(&bad).unwrap_err();
//! assert_eq!(errors.len(), 2);
//! ```

use crate::error::{ValidationError, ValidationErrors};
use crate::money::Money;
use crate::types::{JournalEntryRequest, MovementRequest, MovementType, NewAccount, NewProduct};

/// Result type for single-field validators.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of product and account codes.
pub const MAX_CODE_LEN: usize = 50;
/// Maximum length of display names.
pub const MAX_NAME_LEN: usize = 200;
/// Maximum length of external references.
pub const MAX_REFERENCE_LEN: usize = 100;
/// Maximum length of notes, descriptions, memos and reversal reasons.
pub const MAX_TEXT_LEN: usize = 500;

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a stock movement request.
///
/// ## Rules
/// - `product_id` and `created_by` are required
/// - `quantity` is neither zero nor negative
/// - `unit_cost` is not negative
/// - `TRANSFER` needs a `destination_product_id` different from `product_id`;
///   other types must not carry one
/// - `reference` at most 100 characters, `note` at most 500
pub fn validate_movement(req: &MovementRequest) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    push_err(&mut errors, validate_required("product_id", &req.product_id));

    if req.quantity == 0 {
        errors.push(ValidationError::MustNotBeZero {
            field: "quantity".to_string(),
        });
    } else if req.quantity < 0 {
        errors.push(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }

    push_err(&mut errors, validate_amount("unit_cost", req.unit_cost));

    match (req.movement_type, req.destination_product_id.as_deref()) {
        (MovementType::Transfer, None) => errors.push(ValidationError::Required {
            field: "destination_product_id".to_string(),
        }),
        (MovementType::Transfer, Some(dest)) => {
            if dest.trim().is_empty() {
                errors.push(ValidationError::Required {
                    field: "destination_product_id".to_string(),
                });
            } else if dest == req.product_id {
                errors.push(ValidationError::Conflict {
                    field: "destination_product_id".to_string(),
                    reason: "must differ from product_id".to_string(),
                });
            }
        }
        (_, Some(_)) => errors.push(ValidationError::Conflict {
            field: "destination_product_id".to_string(),
            reason: "is only allowed for TRANSFER movements".to_string(),
        }),
        (_, None) => {}
    }

    push_err(
        &mut errors,
        validate_optional_text("reference", req.reference.as_deref(), MAX_REFERENCE_LEN),
    );
    push_err(
        &mut errors,
        validate_optional_text("note", req.note.as_deref(), MAX_TEXT_LEN),
    );
    push_err(&mut errors, validate_required("created_by", &req.created_by));

    finish(errors)
}

/// Validates a journal entry request.
///
/// ## Rules
/// - `description` at most 500 characters, `reference` at most 100
/// - `created_by` is required
/// - at least one line
/// - every line names an account, has non-negative amounts, and does not
///   carry both a debit and a credit
/// - at least one line has a positive amount
///
/// Balance (Σ debit == Σ credit) is an invariant, checked later by
/// [`crate::invariants::check_balanced`].
pub fn validate_journal_entry(req: &JournalEntryRequest) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    push_err(
        &mut errors,
        validate_optional_text("description", req.description.as_deref(), MAX_TEXT_LEN),
    );
    push_err(
        &mut errors,
        validate_optional_text("reference", req.reference.as_deref(), MAX_REFERENCE_LEN),
    );
    push_err(&mut errors, validate_required("created_by", &req.created_by));

    if req.lines.is_empty() {
        errors.push(ValidationError::Required {
            field: "lines".to_string(),
        });
        return finish(errors);
    }

    for (i, line) in req.lines.iter().enumerate() {
        let prefix = format!("lines[{i}]");

        push_err(
            &mut errors,
            validate_required(&format!("{prefix}.account_id"), &line.account_id),
        );
        push_err(
            &mut errors,
            validate_amount(&format!("{prefix}.debit_amount"), line.debit_amount),
        );
        push_err(
            &mut errors,
            validate_amount(&format!("{prefix}.credit_amount"), line.credit_amount),
        );

        if line.debit_amount.is_positive() && line.credit_amount.is_positive() {
            errors.push(ValidationError::Conflict {
                field: prefix.clone(),
                reason: "must not carry both a debit and a credit".to_string(),
            });
        }

        push_err(
            &mut errors,
            validate_optional_text(&format!("{prefix}.memo"), line.memo.as_deref(), MAX_TEXT_LEN),
        );
    }

    let has_amount = req
        .lines
        .iter()
        .any(|l| l.debit_amount.is_positive() || l.credit_amount.is_positive());
    if !has_amount {
        errors.push(ValidationError::MustNotBeZero {
            field: "lines".to_string(),
        });
    }

    finish(errors)
}

/// Validates a product creation request.
pub fn validate_new_product(req: &NewProduct) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    push_err(&mut errors, validate_code(&req.code));
    push_err(&mut errors, validate_name(&req.name));
    push_err(&mut errors, validate_amount("unit_price", req.unit_price));
    push_err(&mut errors, validate_amount("cost_price", req.cost_price));

    if req.minimum_stock < 0 {
        errors.push(ValidationError::MustNotBeNegative {
            field: "minimum_stock".to_string(),
        });
    }

    finish(errors)
}

/// Validates an account creation request. `kind` is already typed.
pub fn validate_new_account(req: &NewAccount) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    push_err(&mut errors, validate_code(&req.code));
    push_err(&mut errors, validate_name(&req.name));

    finish(errors)
}

/// Validates the reason given for a reversal.
pub fn validate_reason(reason: &str) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    push_err(&mut errors, validate_required("reason", reason));
    push_err(
        &mut errors,
        validate_optional_text("reason", Some(reason), MAX_TEXT_LEN),
    );
    finish(errors)
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a product or account code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, digits, hyphens and underscores
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_code;
///
/// assert!(validate_code("SKU-330").is_ok());
/// assert!(validate_code("").is_err());
/// assert!(validate_code("has space").is_err());
/// ```
pub fn validate_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.chars().count() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name (1 to 200 characters).
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a monetary amount (must not be negative).
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

fn push_err(errors: &mut Vec<ValidationError>, result: ValidationResult<()>) {
    if let Err(e) = result {
        errors.push(e);
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), ValidationErrors> {
    match ValidationErrors::from_vec(errors) {
        Some(errors) => Err(errors),
        None => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
