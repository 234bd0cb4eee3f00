//! # Invariant Checker
//!
//! Decides whether an event may commit, given aggregate state that was read
//! under a hold inside the same atomic scope as the eventual write.
//!
//! ## Check-Then-Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Atomic Scope                                     │
//! │                                                                         │
//! │   hold(product) ──► read quantity_on_hand = 70                          │
//! │                           │                                             │
//! │                           ▼                                             │
//! │            plan_stock_change(product, Outbound, 80)                     │
//! │                           │                                             │
//! │              ┌────────────┴────────────┐                                │
//! │              ▼                         ▼                                │
//! │   70 - 80 < 0: reject           after >= 0: StockPlan                   │
//! │   InsufficientStock             { before, delta, after }                │
//! │   (scope dropped)                      │                                │
//! │                                        ▼                                │
//! │                           write event, apply delta, commit              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function is pure. Passing a value read before the hold was taken
//! defeats the whole point; the executor never does.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Account, Direction, JournalLineRequest, Product, StockMovement};

// =============================================================================
// Stock
// =============================================================================

/// Outcome of a successful stock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPlan {
    pub before: i64,
    pub delta: i64,
    pub after: i64,
}

/// Checks a single-product stock change against the product's current state.
///
/// ## Errors
/// - `InvalidProduct` if the product is inactive
/// - `InsufficientStock` if the result would be negative
/// - `AmountOverflow` if the result leaves the i64 range
///
/// ## Example
/// ```rust
/// # use chrono::Utc;
/// # use tally_core::*;
/// # use tally_core::invariants::plan_stock_change;
/// # let now = Utc::now();
/// # let product = Product {
/// #     id: "p-1".into(), tenant_id: "t-1".into(), code: "W".into(), name: "W".into(),
/// #     unit_price: Money::zero(), cost_price: Money::zero(), quantity_on_hand: 70,
/// #     minimum_stock: 0, status: LifecycleStatus::Active, created_at: now, updated_at: now,
/// # };
/// let plan = plan_stock_change(&product, Direction::Outbound, 30).unwrap();
/// assert_eq!(plan.after, 40);
///
/// let err = plan_stock_change(&product, Direction::Outbound, 80).unwrap_err();
/// assert!(matches!(err, CoreError::InsufficientStock { available: 70, requested: 80, .. }));
/// ```
pub fn plan_stock_change(
    product: &Product,
    direction: Direction,
    quantity: i64,
) -> CoreResult<StockPlan> {
    if !product.is_active() {
        return Err(CoreError::InvalidProduct {
            product_id: product.id.clone(),
        });
    }

    let delta = direction.signed(quantity);
    let before = product.quantity_on_hand;
    let after = before
        .checked_add(delta)
        .ok_or_else(|| CoreError::AmountOverflow {
            context: format!("quantity_on_hand of {}", product.id),
        })?;

    if after < 0 {
        return Err(CoreError::InsufficientStock {
            product_id: product.id.clone(),
            available: before,
            requested: quantity,
        });
    }

    Ok(StockPlan {
        before,
        delta,
        after,
    })
}

/// Checks a transfer as OUT on `source` then IN on `destination`.
///
/// Both checks must pass; the first failure rejects the whole transfer.
pub fn plan_transfer(
    source: &Product,
    destination: &Product,
    quantity: i64,
) -> CoreResult<(StockPlan, StockPlan)> {
    let out = plan_stock_change(source, Direction::Outbound, quantity)?;
    let inbound = plan_stock_change(destination, Direction::Inbound, quantity)?;
    Ok((out, inbound))
}

/// Stored versus recomputed stock for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationReport {
    pub product_id: String,
    /// `quantity_on_hand` as stored on the product row.
    pub stored: i64,
    /// Signed sum of the product's movements.
    pub derived: i64,
}

impl ConservationReport {
    pub fn is_conserved(&self) -> bool {
        self.stored == self.derived
    }
}

/// Recomputes a product's stock from its movement history.
pub fn derive_quantity<'a, I>(movements: I) -> CoreResult<i64>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    movements
        .into_iter()
        .try_fold(0i64, |acc, m| acc.checked_add(m.signed_quantity()))
        .ok_or_else(|| CoreError::AmountOverflow {
            context: "derived quantity".to_string(),
        })
}

/// Compares a product's stored stock with its movement history.
pub fn audit_product(
    product: &Product,
    movements: &[StockMovement],
) -> CoreResult<ConservationReport> {
    Ok(ConservationReport {
        product_id: product.id.clone(),
        stored: product.quantity_on_hand,
        derived: derive_quantity(movements)?,
    })
}

// =============================================================================
// Journal
// =============================================================================

/// Column totals of a set of journal lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTotals {
    pub debit: Money,
    pub credit: Money,
}

impl EntryTotals {
    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }
}

/// Sums both columns with checked arithmetic.
pub fn entry_totals<I>(amounts: I) -> CoreResult<EntryTotals>
where
    I: IntoIterator<Item = (Money, Money)>,
{
    let mut totals = EntryTotals::default();
    for (debit, credit) in amounts {
        totals.debit = totals
            .debit
            .checked_add(debit)
            .ok_or_else(|| overflow("total debit"))?;
        totals.credit = totals
            .credit
            .checked_add(credit)
            .ok_or_else(|| overflow("total credit"))?;
    }
    Ok(totals)
}

/// Rejects an entry whose debits and credits differ.
///
/// The comparison is exact; amounts are integral minor units.
pub fn check_balanced(lines: &[JournalLineRequest]) -> CoreResult<EntryTotals> {
    let totals = entry_totals(lines.iter().map(|l| (l.debit_amount, l.credit_amount)))?;

    if !totals.is_balanced() {
        return Err(CoreError::UnbalancedEntry {
            debit: totals.debit,
            credit: totals.credit,
        });
    }

    Ok(totals)
}

/// Net change to one account caused by an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPlan {
    pub account_id: String,
    pub before: Money,
    pub delta: Money,
    pub after: Money,
}

/// Computes per-account balance changes for an entry.
///
/// `accounts` holds the rows read under the hold. A line whose account is
/// missing, belongs to another tenant, or is inactive rejects the entry with
/// `InvalidAccount`, reported for the first such line. Deltas are aggregated
/// per account using the account kind's normal side. The result is ordered
/// by account id.
pub fn plan_account_postings(
    tenant_id: &str,
    accounts: &[Account],
    lines: &[JournalLineRequest],
) -> CoreResult<Vec<AccountPlan>> {
    let by_id: BTreeMap<&str, &Account> = accounts
        .iter()
        .filter(|a| a.tenant_id == tenant_id)
        .map(|a| (a.id.as_str(), a))
        .collect();

    let mut deltas: BTreeMap<&str, (&Account, Money)> = BTreeMap::new();

    for line in lines {
        let account = by_id
            .get(line.account_id.as_str())
            .filter(|a| a.is_active())
            .ok_or_else(|| CoreError::InvalidAccount {
                account_id: line.account_id.clone(),
            })?;

        let line_delta = account
            .kind
            .balance_delta(line.debit_amount, line.credit_amount)
            .ok_or_else(|| overflow("line delta"))?;

        let (_, slot) = deltas
            .entry(account.id.as_str())
            .or_insert((*account, Money::zero()));
        *slot = slot
            .checked_add(line_delta)
            .ok_or_else(|| overflow("account delta"))?;
    }

    deltas
        .into_iter()
        .map(|(id, (account, delta))| {
            let after = account
                .balance
                .checked_add(delta)
                .ok_or_else(|| overflow(&format!("balance of {id}")))?;
            Ok(AccountPlan {
                account_id: id.to_string(),
                before: account.balance,
                delta,
                after,
            })
        })
        .collect()
}

fn overflow(context: &str) -> CoreError {
    CoreError::AmountOverflow {
        context: context.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
