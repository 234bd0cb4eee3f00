//! # Ledger Store
//!
//! The storage seam of the engine: durable state, per-aggregate holds, and
//! atomic scopes.
//!
//! ## Atomic Scope Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  store.begin() ──► Box<dyn UnitOfWork>                                  │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  uow.hold(tenant, HoldRequest) ──► HeldRows (fresh, under the hold)     │
//! │                         │            exactly one call per scope         │
//! │                         ▼                                               │
//! │  uow.insert_movement / insert_journal_entry                             │
//! │  uow.apply_stock_delta / apply_account_delta   (held rows only)         │
//! │                         │                                               │
//! │            ┌────────────┴─────────────┐                                 │
//! │            ▼                          ▼                                 │
//! │     uow.commit()               drop(uow) or uow.rollback()              │
//! │     all writes visible,        nothing visible,                         │
//! │     holds released             holds released                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Implementations
//! - [`SqliteStore`]: sqlx transaction per scope, process holds plus
//!   SQLite's write lock
//! - [`InMemoryStore`]: staged writes applied under one lock at commit,
//!   with fault injection for atomicity tests

use async_trait::async_trait;

use crate::error::DbResult;
use crate::repository::journal::Posting;
use tally_core::{
    Account, JournalEntry, LifecycleStatus, Money, Product, StockMovement,
};

pub mod holds;
pub mod memory;
pub mod sqlite;

pub use holds::{HoldGuard, HoldKey, HoldTable};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

// =============================================================================
// Hold Requests
// =============================================================================

/// Aggregates a scope wants to hold, all in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldRequest {
    pub products: Vec<String>,
    pub accounts: Vec<String>,
}

impl HoldRequest {
    pub fn products<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HoldRequest {
            products: ids.into_iter().map(Into::into).collect(),
            accounts: Vec::new(),
        }
    }

    pub fn accounts<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HoldRequest {
            products: Vec::new(),
            accounts: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Hold keys in global acquisition order, without duplicates.
    pub fn keys(&self, tenant_id: &str) -> Vec<HoldKey> {
        let mut keys: Vec<HoldKey> = self
            .products
            .iter()
            .map(|id| HoldKey::product(tenant_id, id))
            .chain(self.accounts.iter().map(|id| HoldKey::account(tenant_id, id)))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Rows read under the hold. Ids that don't exist for the tenant are
/// simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldRows {
    pub products: Vec<Product>,
    pub accounts: Vec<Account>,
}

impl HeldRows {
    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Durable ledger state.
///
/// Everything here runs outside any scope and is keyed by tenant: a row
/// that belongs to another tenant reads as `None`.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Opens an atomic scope.
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>>;

    async fn product(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>>;

    async fn account(&self, tenant_id: &str, id: &str) -> DbResult<Option<Account>>;

    async fn movement(&self, tenant_id: &str, id: &str) -> DbResult<Option<StockMovement>>;

    /// A product's movements in business-time order.
    async fn movements_for_product(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockMovement>>;

    /// Both legs of a transfer, source first.
    async fn transfer_legs(
        &self,
        tenant_id: &str,
        transfer_id: &str,
    ) -> DbResult<Vec<StockMovement>>;

    async fn journal_entry(&self, tenant_id: &str, id: &str) -> DbResult<Option<JournalEntry>>;

    /// Every line posted to an account, oldest first.
    async fn account_postings(&self, tenant_id: &str, account_id: &str)
        -> DbResult<Vec<Posting>>;

    /// Σ debit and Σ credit over all of a tenant's lines.
    async fn journal_totals(&self, tenant_id: &str) -> DbResult<(Money, Money)>;

    /// Fails with `UniqueViolation` if the code is taken within the tenant.
    async fn insert_product(&self, product: &Product) -> DbResult<Product>;

    /// Fails with `UniqueViolation` if the code is taken within the tenant.
    async fn insert_account(&self, account: &Account) -> DbResult<Account>;

    /// Active products with `quantity_on_hand < minimum_stock`, by code.
    async fn products_below_minimum(&self, tenant_id: &str) -> DbResult<Vec<Product>>;
}

/// One atomic scope. Dropping it without `commit` discards every write.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Acquires holds on every requested aggregate, in global order, and
    /// returns the rows re-read under those holds. Allowed once per scope.
    async fn hold(&mut self, tenant_id: &str, request: HoldRequest) -> DbResult<HeldRows>;

    /// Appends a movement row. Fails with `UniqueViolation` when the
    /// movement it reverses already has a reversal.
    async fn insert_movement(&mut self, movement: &StockMovement) -> DbResult<()>;

    /// Adds `delta` to a held product's stock, returning the new value.
    async fn apply_stock_delta(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        delta: i64,
    ) -> DbResult<i64>;

    /// Appends an entry and its lines.
    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> DbResult<()>;

    /// Adds `delta` to a held account's balance, returning the new balance.
    async fn apply_account_delta(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        delta: Money,
    ) -> DbResult<Money>;

    async fn set_product_status(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        status: LifecycleStatus,
    ) -> DbResult<Product>;

    async fn set_account_status(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        status: LifecycleStatus,
    ) -> DbResult<Account>;

    /// Makes every write visible at once, then releases the holds.
    async fn commit(self: Box<Self>) -> DbResult<()>;

    /// Discards every write, then releases the holds.
    async fn rollback(self: Box<Self>) -> DbResult<()>;
}

// =============================================================================
// Shared Scope Bookkeeping
// =============================================================================

/// Tracks what a scope holds so writes to unheld aggregates are refused.
#[derive(Debug, Default)]
pub(crate) struct HeldSet {
    acquired: bool,
    tenant_id: String,
    products: Vec<String>,
    accounts: Vec<String>,
}

impl HeldSet {
    pub(crate) fn start(&mut self, tenant_id: &str, request: &HoldRequest) -> DbResult<()> {
        if self.acquired {
            return Err(crate::error::DbError::TransactionFailed(
                "holds already acquired for this scope".to_string(),
            ));
        }
        self.acquired = true;
        self.tenant_id = tenant_id.to_string();
        self.products = request.products.clone();
        self.accounts = request.accounts.clone();
        Ok(())
    }

    pub(crate) fn check_product(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        if self.tenant_id == tenant_id && self.products.iter().any(|p| p == id) {
            Ok(())
        } else {
            Err(not_held("product", id))
        }
    }

    pub(crate) fn check_account(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        if self.tenant_id == tenant_id && self.accounts.iter().any(|a| a == id) {
            Ok(())
        } else {
            Err(not_held("account", id))
        }
    }
}

fn not_held(kind: &str, id: &str) -> crate::error::DbError {
    crate::error::DbError::TransactionFailed(format!("{kind} {id} is not held by this scope"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_request_keys_are_ordered() {
        let request = HoldRequest {
            products: vec!["p-2".to_string(), "p-1".to_string(), "p-2".to_string()],
            accounts: vec!["a-1".to_string()],
        };
        let keys = request.keys("t-1");
        let ids: Vec<&str> = keys.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["p-1", "p-2", "a-1"]);
    }

    #[test]
    fn test_held_set() {
        let mut held = HeldSet::default();
        held.start("t-1", &HoldRequest::products(["p-1"])).unwrap();

        assert!(held.check_product("t-1", "p-1").is_ok());
        assert!(held.check_product("t-1", "p-2").is_err());
        assert!(held.check_product("t-2", "p-1").is_err());
        assert!(held.check_account("t-1", "p-1").is_err());
        assert!(held.start("t-1", &HoldRequest::default()).is_err());
    }
}
