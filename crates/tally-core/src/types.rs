//! # Domain Types
//!
//! Aggregates, events and request payloads shared by every Tally crate.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  AGGREGATES (mutable summaries)     EVENTS (append-only)                │
//! │  ┌─────────────────┐               ┌──────────────────────┐            │
//! │  │    Product      │◄──────────────│   StockMovement      │            │
//! │  │  ─────────────  │  signed sum   │  ──────────────────  │            │
//! │  │  code           │               │  movement_type       │            │
//! │  │  quantity_on_   │               │  quantity > 0        │            │
//! │  │    hand         │               │  transfer_leg        │            │
//! │  └─────────────────┘               └──────────────────────┘            │
//! │                                                                         │
//! │  ┌─────────────────┐               ┌──────────────────────┐            │
//! │  │    Account      │◄──────────────│   JournalEntry       │            │
//! │  │  ─────────────  │  normal-side  │  └── JournalLine[]   │            │
//! │  │  kind           │  sum          │      debit / credit  │            │
//! │  │  balance        │               │      Σ debit == Σ    │            │
//! │  └─────────────────┘               │        credit        │            │
//! │                                    └──────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tenant Scoping
//! Every aggregate and event carries `tenant_id`. Lookups are always keyed by
//! `(tenant_id, id)`; a row owned by another tenant is indistinguishable from
//! a missing one.
//!
//! ## Sign Convention
//! Quantities and amounts on events are never negative. The effect on the
//! aggregate comes from the movement type (or transfer leg) and from the
//! debit/credit side combined with the account's normal side.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Lifecycle Status
// =============================================================================

/// Whether an aggregate accepts new events.
///
/// Products and accounts are never deleted; they are deactivated instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Inactive,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Inactive => "inactive",
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleStatus::Active)
    }
}

impl FromStr for LifecycleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(LifecycleStatus::Active),
            "inactive" => Ok(LifecycleStatus::Inactive),
            _ => Err(not_allowed("status", &["active", "inactive"])),
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Aggregate Identity
// =============================================================================

/// The two kinds of aggregate the engine maintains.
///
/// The derived `Ord` is part of the global hold order: products sort before
/// accounts, then by tenant, then by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Product,
    Account,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Product => "product",
            AggregateKind::Account => "account",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a single aggregate within a tenant, used for balance reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AggregateRef {
    Product(String),
    Account(String),
}

impl AggregateRef {
    pub fn kind(&self) -> AggregateKind {
        match self {
            AggregateRef::Product(_) => AggregateKind::Product,
            AggregateRef::Account(_) => AggregateKind::Account,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AggregateRef::Product(id) | AggregateRef::Account(id) => id,
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stocked item. `quantity_on_hand` is the signed sum of its movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this product belongs to.
    pub tenant_id: String,

    /// Business identifier, unique per tenant.
    pub code: String,

    /// Display name.
    pub name: String,

    /// Selling price in minor units.
    pub unit_price: Money,

    /// Purchase cost in minor units.
    pub cost_price: Money,

    /// Current stock level. Mutated only by the executor.
    pub quantity_on_hand: i64,

    /// Reorder threshold.
    pub minimum_stock: i64,

    pub status: LifecycleStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// True when stock has fallen under the reorder threshold.
    pub fn needs_reorder(&self) -> bool {
        self.quantity_on_hand < self.minimum_stock
    }
}

/// Payload for creating a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub unit_price: Money,
    #[serde(default)]
    pub cost_price: Money,
    #[serde(default)]
    pub minimum_stock: i64,
}

// =============================================================================
// Stock Movements
// =============================================================================

/// Kind of stock movement.
///
/// Stored and serialized as `IN`, `OUT`, `ADJUSTMENT_IN`, `ADJUSTMENT_OUT`
/// and `TRANSFER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    AdjustmentIn,
    AdjustmentOut,
    Transfer,
}

impl MovementType {
    pub const ALL: [MovementType; 5] = [
        MovementType::In,
        MovementType::Out,
        MovementType::AdjustmentIn,
        MovementType::AdjustmentOut,
        MovementType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::AdjustmentIn => "ADJUSTMENT_IN",
            MovementType::AdjustmentOut => "ADJUSTMENT_OUT",
            MovementType::Transfer => "TRANSFER",
        }
    }

    /// Effect on the product's stock. `None` for `Transfer`, whose direction
    /// depends on the leg.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            MovementType::In | MovementType::AdjustmentIn => Some(Direction::Inbound),
            MovementType::Out | MovementType::AdjustmentOut => Some(Direction::Outbound),
            MovementType::Transfer => None,
        }
    }
}

impl FromStr for MovementType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                not_allowed(
                    "movement_type",
                    &MovementType::ALL.map(|t| t.as_str()),
                )
            })
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a movement adds to or removes from stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Applies the direction to a non-negative quantity.
    #[inline]
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            Direction::Inbound => quantity,
            Direction::Outbound => -quantity,
        }
    }
}

/// Which side of a transfer a movement row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransferLeg {
    /// Stock leaves `product_id`.
    Source,
    /// Stock arrives at `product_id`.
    Destination,
}

impl TransferLeg {
    pub fn direction(&self) -> Direction {
        match self {
            TransferLeg::Source => Direction::Outbound,
            TransferLeg::Destination => Direction::Inbound,
        }
    }
}

/// An immutable stock event.
///
/// ## Transfers
/// ```text
/// TRANSFER 10 from A to B  ──►  two rows sharing transfer_id
///
///   ┌──────────────────────────┐      ┌──────────────────────────┐
///   │ product_id = A           │      │ product_id = B           │
///   │ transfer_leg = source    │      │ transfer_leg = destination│
///   │ counterpart = B          │      │ counterpart = A          │
///   │ effect: -10              │      │ effect: +10              │
///   └──────────────────────────┘      └──────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub movement_type: MovementType,

    /// Always positive.
    pub quantity: i64,

    pub unit_cost: Money,
    pub reference: Option<String>,
    pub note: Option<String>,

    /// Business time of the movement.
    pub occurred_at: DateTime<Utc>,

    /// When the row was committed.
    pub recorded_at: DateTime<Utc>,

    pub created_by: String,

    pub transfer_id: Option<String>,
    pub transfer_leg: Option<TransferLeg>,
    pub counterpart_product_id: Option<String>,

    /// Set when this movement compensates another one.
    pub reverses_movement_id: Option<String>,
}

impl StockMovement {
    /// Direction of this row's effect on `product_id`.
    pub fn direction(&self) -> Option<Direction> {
        match self.movement_type.direction() {
            Some(direction) => Some(direction),
            None => self.transfer_leg.map(|leg| leg.direction()),
        }
    }

    /// Signed effect on the product's `quantity_on_hand`.
    pub fn signed_quantity(&self) -> i64 {
        self.direction()
            .map(|d| d.signed(self.quantity))
            .unwrap_or(0)
    }

    pub fn is_transfer(&self) -> bool {
        self.movement_type == MovementType::Transfer
    }
}

/// Payload for `apply_movement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    #[serde(default)]
    pub unit_cost: Money,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Defaults to the commit time when absent.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    pub created_by: String,
    /// Required for `TRANSFER`, forbidden otherwise.
    #[serde(default)]
    pub destination_product_id: Option<String>,
}

impl MovementRequest {
    /// A request with only the mandatory fields filled in.
    pub fn new(
        product_id: impl Into<String>,
        movement_type: MovementType,
        quantity: i64,
        created_by: impl Into<String>,
    ) -> Self {
        MovementRequest {
            product_id: product_id.into(),
            movement_type,
            quantity,
            unit_cost: Money::zero(),
            reference: None,
            note: None,
            occurred_at: None,
            created_by: created_by.into(),
            destination_product_id: None,
        }
    }

    /// A transfer of `quantity` from `source` to `destination`.
    pub fn transfer(
        source: impl Into<String>,
        destination: impl Into<String>,
        quantity: i64,
        created_by: impl Into<String>,
    ) -> Self {
        MovementRequest {
            destination_product_id: Some(destination.into()),
            ..MovementRequest::new(source, MovementType::Transfer, quantity, created_by)
        }
    }

    pub fn with_unit_cost(mut self, unit_cost: Money) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Account classification. Determines the normal balance side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    pub const ALL: [AccountKind; 5] = [
        AccountKind::Asset,
        AccountKind::Liability,
        AccountKind::Equity,
        AccountKind::Revenue,
        AccountKind::Expense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Revenue => "revenue",
            AccountKind::Expense => "expense",
        }
    }

    /// The side that increases the balance.
    pub fn normal_side(&self) -> Side {
        match self {
            AccountKind::Asset | AccountKind::Expense => Side::Debit,
            AccountKind::Liability | AccountKind::Equity | AccountKind::Revenue => Side::Credit,
        }
    }

    /// Balance change caused by one line, `None` on overflow.
    ///
    /// ```rust
    /// use tally_core::{AccountKind, Money};
    ///
    /// let d = Money::from_minor(500);
    /// let c = Money::zero();
    /// assert_eq!(AccountKind::Asset.balance_delta(d, c), Some(Money::from_minor(500)));
    /// assert_eq!(AccountKind::Revenue.balance_delta(d, c), Some(Money::from_minor(-500)));
    /// ```
    pub fn balance_delta(&self, debit: Money, credit: Money) -> Option<Money> {
        match self.normal_side() {
            Side::Debit => debit.checked_sub(credit),
            Side::Credit => credit.checked_sub(debit),
        }
    }
}

impl FromStr for AccountKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AccountKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| not_allowed("kind", &AccountKind::ALL.map(|k| k.as_str())))
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debit or credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Debit,
    Credit,
}

/// A ledger account. `balance` is the normal-side sum of its journal lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    pub id: String,
    pub tenant_id: String,
    /// Unique per tenant.
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    /// May be negative.
    pub balance: Money,
    pub status: LifecycleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Payload for creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
}

// =============================================================================
// Journal
// =============================================================================

/// An immutable, balanced journal posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct JournalEntry {
    pub id: String,
    pub tenant_id: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub created_by: String,
    pub reverses_entry_id: Option<String>,

    /// Loaded separately from `journal_lines`.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Sum of the debit column.
    pub fn total_debit(&self) -> Money {
        self.lines.iter().map(|l| l.debit_amount).sum()
    }

    /// Sum of the credit column.
    pub fn total_credit(&self) -> Money {
        self.lines.iter().map(|l| l.credit_amount).sum()
    }
}

/// One line of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct JournalLine {
    pub id: String,
    pub entry_id: String,
    /// 1-based position within the entry.
    pub line_no: i64,
    pub account_id: String,
    pub debit_amount: Money,
    pub credit_amount: Money,
    pub memo: Option<String>,
}

/// Payload for `post_journal_entry`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub lines: Vec<JournalLineRequest>,
}

impl JournalEntryRequest {
    pub fn new(created_by: impl Into<String>) -> Self {
        JournalEntryRequest {
            created_by: created_by.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    pub fn debit(mut self, account_id: impl Into<String>, amount: i64) -> Self {
        self.lines.push(JournalLineRequest {
            account_id: account_id.into(),
            debit_amount: Money::from_minor(amount),
            credit_amount: Money::zero(),
            memo: None,
        });
        self
    }

    pub fn credit(mut self, account_id: impl Into<String>, amount: i64) -> Self {
        self.lines.push(JournalLineRequest {
            account_id: account_id.into(),
            debit_amount: Money::zero(),
            credit_amount: Money::from_minor(amount),
            memo: None,
        });
        self
    }
}

/// One line of a journal entry request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLineRequest {
    pub account_id: String,
    #[serde(default)]
    pub debit_amount: Money,
    #[serde(default)]
    pub credit_amount: Money,
    #[serde(default)]
    pub memo: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

fn not_allowed(field: &str, allowed: &[&str]) -> ValidationError {
    ValidationError::NotAllowed {
        field: field.to_string(),
        allowed: allowed.iter().map(|s| s.to_string()).collect(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(movement_type: MovementType, leg: Option<TransferLeg>) -> StockMovement {
        let now = Utc::now();
        StockMovement {
            id: "m-1".to_string(),
            tenant_id: "t-1".to_string(),
            product_id: "p-1".to_string(),
            movement_type,
            quantity: 10,
            unit_cost: Money::zero(),
            reference: None,
            note: None,
            occurred_at: now,
            recorded_at: now,
            created_by: "tester".to_string(),
            transfer_id: None,
            transfer_leg: leg,
            counterpart_product_id: None,
            reverses_movement_id: None,
        }
    }

    #[test]
    fn test_signed_quantity() {
        assert_eq!(movement(MovementType::In, None).signed_quantity(), 10);
        assert_eq!(movement(MovementType::AdjustmentIn, None).signed_quantity(), 10);
        assert_eq!(movement(MovementType::Out, None).signed_quantity(), -10);
        assert_eq!(movement(MovementType::AdjustmentOut, None).signed_quantity(), -10);
        assert_eq!(
            movement(MovementType::Transfer, Some(TransferLeg::Source)).signed_quantity(),
            -10
        );
        assert_eq!(
            movement(MovementType::Transfer, Some(TransferLeg::Destination)).signed_quantity(),
            10
        );
    }

    #[test]
    fn test_movement_type_from_str() {
        assert_eq!("IN".parse::<MovementType>().unwrap(), MovementType::In);
        assert_eq!(
            "adjustment_out".parse::<MovementType>().unwrap(),
            MovementType::AdjustmentOut
        );

        let err = "SIDEWAYS".parse::<MovementType>().unwrap_err();
        match err {
            ValidationError::NotAllowed { field, allowed } => {
                assert_eq!(field, "movement_type");
                assert_eq!(allowed.len(), 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_movement_type_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&MovementType::AdjustmentIn).unwrap();
        assert_eq!(json, "\"ADJUSTMENT_IN\"");
    }

    #[test]
    fn test_account_kind_normal_side() {
        assert_eq!(AccountKind::Asset.normal_side(), Side::Debit);
        assert_eq!(AccountKind::Expense.normal_side(), Side::Debit);
        assert_eq!(AccountKind::Liability.normal_side(), Side::Credit);
        assert_eq!(AccountKind::Equity.normal_side(), Side::Credit);
        assert_eq!(AccountKind::Revenue.normal_side(), Side::Credit);
    }

    #[test]
    fn test_balance_delta_overflow() {
        let delta = AccountKind::Asset.balance_delta(Money::from_minor(i64::MIN), Money::from_minor(1));
        assert_eq!(delta, None);
    }

    #[test]
    fn test_status_and_kind_parsing() {
        assert_eq!("Inactive".parse::<LifecycleStatus>().unwrap(), LifecycleStatus::Inactive);
        assert!("archived".parse::<LifecycleStatus>().is_err());
        assert_eq!("REVENUE".parse::<AccountKind>().unwrap(), AccountKind::Revenue);
        assert!("income".parse::<AccountKind>().is_err());
    }

    #[test]
    fn test_aggregate_kind_orders_products_first() {
        assert!(AggregateKind::Product < AggregateKind::Account);
        let r = AggregateRef::Account("a-1".to_string());
        assert_eq!(r.kind(), AggregateKind::Account);
        assert_eq!(r.id(), "a-1");
    }

    #[test]
    fn test_journal_request_builder() {
        let req = JournalEntryRequest::new("clerk")
            .with_description("Opening balance")
            .debit("cash", 5000)
            .credit("equity", 5000);
        assert_eq!(req.lines.len(), 2);
        assert_eq!(req.lines[0].debit_amount, Money::from_minor(5000));
        assert!(req.lines[1].debit_amount.is_zero());
    }
}
