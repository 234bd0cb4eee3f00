//! # Reversal Planning
//!
//! Builds the compensating request for a committed event. History is never
//! edited; a mistake is undone by a new event with the opposite effect.
//!
//! ```text
//!   original                      compensation
//!   ────────────────────────      ─────────────────────────────────
//!   IN 50                    ──►  OUT 50
//!   ADJUSTMENT_OUT 3         ──►  ADJUSTMENT_IN 3
//!   TRANSFER 10  A ──► B     ──►  TRANSFER 10  B ──► A
//!   Dr cash 500 / Cr sales   ──►  Dr sales 500 / Cr cash
//! ```
//!
//! The executor runs the compensation through the normal path, so it is
//! subject to the same invariants (reversing an IN whose stock was already
//! sold fails with `InsufficientStock`).

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{
    JournalEntry, JournalEntryRequest, JournalLine, JournalLineRequest, MovementRequest,
    MovementType, StockMovement, TransferLeg,
};

/// The movement type with the opposite effect.
///
/// `TRANSFER` maps to itself; its direction is flipped by swapping source
/// and destination.
pub fn reversing_movement_type(movement_type: MovementType) -> MovementType {
    match movement_type {
        MovementType::In => MovementType::Out,
        MovementType::Out => MovementType::In,
        MovementType::AdjustmentIn => MovementType::AdjustmentOut,
        MovementType::AdjustmentOut => MovementType::AdjustmentIn,
        MovementType::Transfer => MovementType::Transfer,
    }
}

/// The `(source, destination)` products of a transfer, from either leg.
pub fn transfer_endpoints(leg: &StockMovement) -> CoreResult<(String, String)> {
    let counterpart = leg
        .counterpart_product_id
        .clone()
        .ok_or_else(|| missing("counterpart_product_id"))?;

    match leg.transfer_leg {
        Some(TransferLeg::Source) => Ok((leg.product_id.clone(), counterpart)),
        Some(TransferLeg::Destination) => Ok((counterpart, leg.product_id.clone())),
        None => Err(missing("transfer_leg")),
    }
}

/// Builds the request that negates `original`.
///
/// The reason becomes the note; the original reference is carried over.
pub fn movement_reversal(
    original: &StockMovement,
    reason: &str,
    actor: &str,
) -> CoreResult<MovementRequest> {
    let mut request = if original.is_transfer() {
        let (source, destination) = transfer_endpoints(original)?;
        MovementRequest::transfer(destination, source, original.quantity, actor)
    } else {
        MovementRequest::new(
            original.product_id.clone(),
            reversing_movement_type(original.movement_type),
            original.quantity,
            actor,
        )
    };

    request.unit_cost = original.unit_cost;
    request.reference = original.reference.clone();
    request.note = Some(reason.to_string());
    Ok(request)
}

/// Journal lines with debit and credit swapped, in the original order.
pub fn reversing_lines(lines: &[JournalLine]) -> Vec<JournalLineRequest> {
    lines
        .iter()
        .map(|line| JournalLineRequest {
            account_id: line.account_id.clone(),
            debit_amount: line.credit_amount,
            credit_amount: line.debit_amount,
            memo: line.memo.clone(),
        })
        .collect()
}

/// Builds the entry request that negates `original`.
pub fn entry_reversal(original: &JournalEntry, reason: &str, actor: &str) -> JournalEntryRequest {
    JournalEntryRequest {
        description: Some(reason.to_string()),
        reference: original.reference.clone(),
        occurred_at: None,
        created_by: actor.to_string(),
        lines: reversing_lines(&original.lines),
    }
}

fn missing(field: &str) -> CoreError {
    CoreError::Validation(
        ValidationError::Required {
            field: field.to_string(),
        }
        .into(),
    )
}
