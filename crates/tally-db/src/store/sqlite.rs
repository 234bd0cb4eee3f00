//! # SQLite Store
//!
//! [`LedgerStore`] over a sqlx pool. One atomic scope is one sqlx
//! transaction on a pinned connection.
//!
//! ## Hold Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  begin()          BEGIN (deferred, nothing locked yet)                  │
//! │     │                                                                   │
//! │  hold()           1. HoldTable::acquire(sorted keys)   per-aggregate    │
//! │     │             2. UPDATE ... SET x = x              SQLite write     │
//! │     │                (first statement of the scope)    lock, no stale   │
//! │     │             3. SELECT the held rows              snapshot         │
//! │     │                                                                   │
//! │  writes           INSERT event / UPDATE ... RETURNING                   │
//! │     │                                                                   │
//! │  commit()         COMMIT, then release the holds                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because the first statement of every scope is a write, SQLite never
//! hands a scope a read snapshot it later has to upgrade. Writers queue on
//! the busy timeout instead of failing with `SQLITE_BUSY_SNAPSHOT`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, warn};

use super::holds::{HoldGuard, HoldTable};
use super::{HeldRows, HeldSet, HoldRequest, LedgerStore, UnitOfWork};
use crate::error::{DbError, DbResult};
use crate::pool::{Database, DbConfig};
use crate::repository::journal::Posting;
use crate::repository::{account, journal, movement, product};
use tally_core::{
    Account, AggregateKind, JournalEntry, LifecycleStatus, Money, Product, StockMovement,
};

// =============================================================================
// Store
// =============================================================================

/// SQLite-backed ledger store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
    holds: Arc<HoldTable>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore {
            db,
            holds: Arc::new(HoldTable::new()),
        }
    }

    /// Opens the pool (running migrations if configured) and wraps it.
    pub async fn connect(config: DbConfig) -> DbResult<Self> {
        Ok(Self::new(Database::new(config).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn holds(&self) -> &Arc<HoldTable> {
        &self.holds
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>> {
        let tx = self.db.pool().begin().await?;
        Ok(Box::new(SqliteUnitOfWork {
            tx,
            table: Arc::clone(&self.holds),
            guard: None,
            held: HeldSet::default(),
        }))
    }

    async fn product(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>> {
        self.db.products().get_by_id(tenant_id, id).await
    }

    async fn account(&self, tenant_id: &str, id: &str) -> DbResult<Option<Account>> {
        self.db.accounts().get_by_id(tenant_id, id).await
    }

    async fn movement(&self, tenant_id: &str, id: &str) -> DbResult<Option<StockMovement>> {
        self.db.movements().get_by_id(tenant_id, id).await
    }

    async fn movements_for_product(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        self.db.movements().for_product(tenant_id, product_id).await
    }

    async fn transfer_legs(
        &self,
        tenant_id: &str,
        transfer_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        self.db.movements().transfer_legs(tenant_id, transfer_id).await
    }

    async fn journal_entry(&self, tenant_id: &str, id: &str) -> DbResult<Option<JournalEntry>> {
        self.db.journal().get_entry(tenant_id, id).await
    }

    async fn account_postings(
        &self,
        tenant_id: &str,
        account_id: &str,
    ) -> DbResult<Vec<Posting>> {
        self.db
            .journal()
            .postings_for_account(tenant_id, account_id)
            .await
    }

    async fn journal_totals(&self, tenant_id: &str) -> DbResult<(Money, Money)> {
        self.db.journal().totals(tenant_id).await
    }

    async fn insert_product(&self, product: &Product) -> DbResult<Product> {
        self.db.products().insert(product).await
    }

    async fn insert_account(&self, account: &Account) -> DbResult<Account> {
        self.db.accounts().insert(account).await
    }

    async fn products_below_minimum(&self, tenant_id: &str) -> DbResult<Vec<Product>> {
        self.db.products().below_minimum(tenant_id).await
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// An open SQLite transaction plus the process holds it owns.
///
/// Dropping it rolls the transaction back (sqlx queues the ROLLBACK on the
/// connection) and releases the holds.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
    table: Arc<HoldTable>,
    guard: Option<HoldGuard>,
    held: HeldSet,
}

impl SqliteUnitOfWork {
    fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn hold(&mut self, tenant_id: &str, request: HoldRequest) -> DbResult<HeldRows> {
        self.held.start(tenant_id, &request)?;

        let keys = request.keys(tenant_id);
        self.guard = Some(self.table.acquire(keys.clone()).await?);

        let mut rows = HeldRows::default();
        for key in &keys {
            match key.kind {
                AggregateKind::Product => {
                    if product::touch(self.conn(), tenant_id, &key.id).await? {
                        if let Some(p) = product::fetch(self.conn(), tenant_id, &key.id).await? {
                            rows.products.push(p);
                        }
                    }
                }
                AggregateKind::Account => {
                    if account::touch(self.conn(), tenant_id, &key.id).await? {
                        if let Some(a) = account::fetch(self.conn(), tenant_id, &key.id).await? {
                            rows.accounts.push(a);
                        }
                    }
                }
            }
        }

        debug!(
            tenant_id = %tenant_id,
            products = rows.products.len(),
            accounts = rows.accounts.len(),
            "Aggregates held"
        );
        Ok(rows)
    }

    async fn insert_movement(&mut self, m: &StockMovement) -> DbResult<()> {
        self.held.check_product(&m.tenant_id, &m.product_id)?;
        movement::insert(self.conn(), m).await
    }

    async fn apply_stock_delta(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        delta: i64,
    ) -> DbResult<i64> {
        self.held.check_product(tenant_id, product_id)?;
        product::apply_delta(self.conn(), tenant_id, product_id, delta, Utc::now()).await
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> DbResult<()> {
        for line in &entry.lines {
            self.held.check_account(&entry.tenant_id, &line.account_id)?;
        }
        journal::insert_entry(self.conn(), entry).await
    }

    async fn apply_account_delta(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        delta: Money,
    ) -> DbResult<Money> {
        self.held.check_account(tenant_id, account_id)?;
        account::apply_delta(self.conn(), tenant_id, account_id, delta, Utc::now()).await
    }

    async fn set_product_status(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        status: LifecycleStatus,
    ) -> DbResult<Product> {
        self.held.check_product(tenant_id, product_id)?;
        product::set_status(self.conn(), tenant_id, product_id, status, Utc::now()).await
    }

    async fn set_account_status(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        status: LifecycleStatus,
    ) -> DbResult<Account> {
        self.held.check_account(tenant_id, account_id)?;
        account::set_status(self.conn(), tenant_id, account_id, status, Utc::now()).await
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let SqliteUnitOfWork { tx, guard, .. } = *self;

        tx.commit().await.map_err(|e| match DbError::from(e) {
            DbError::Busy(msg) => DbError::Busy(msg),
            other => DbError::TransactionFailed(other.to_string()),
        })?;

        // Holds go only after the commit is durable.
        drop(guard);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        let SqliteUnitOfWork { tx, guard, .. } = *self;

        let result = tx.rollback().await;
        drop(guard);

        result.map_err(|e| {
            warn!(error = %e, "Rollback failed");
            DbError::TransactionFailed(e.to_string())
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::{AccountKind, JournalLine, MovementType};

    async fn store() -> SqliteStore {
        SqliteStore::connect(DbConfig::in_memory()).await.unwrap()
    }

    fn product(tenant: &str, code: &str, qty: i64) -> Product {
        let now = Utc::now();
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            code: code.to_string(),
            name: format!("Product {code}"),
            unit_price: Money::from_minor(1000),
            cost_price: Money::from_minor(600),
            quantity_on_hand: qty,
            minimum_stock: 5,
            status: LifecycleStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn account(tenant: &str, code: &str, kind: AccountKind) -> Account {
        let now = Utc::now();
        Account {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            code: code.to_string(),
            name: format!("Account {code}"),
            kind,
            balance: Money::zero(),
            status: LifecycleStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn movement(p: &Product, movement_type: MovementType, quantity: i64) -> StockMovement {
        let now = Utc::now();
        StockMovement {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: p.tenant_id.clone(),
            product_id: p.id.clone(),
            movement_type,
            quantity,
            unit_cost: Money::zero(),
            reference: None,
            note: None,
            occurred_at: now,
            recorded_at: now,
            created_by: "tester".to_string(),
            transfer_id: None,
            transfer_leg: None,
            counterpart_product_id: None,
            reverses_movement_id: None,
        }
    }

    fn entry(tenant: &str, debit: &Account, credit: &Account, amount: i64) -> JournalEntry {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let line = |no: i64, account: &Account, d: i64, c: i64| JournalLine {
            id: uuid::Uuid::new_v4().to_string(),
            entry_id: id.clone(),
            line_no: no,
            account_id: account.id.clone(),
            debit_amount: Money::from_minor(d),
            credit_amount: Money::from_minor(c),
            memo: None,
        };
        JournalEntry {
            id: id.clone(),
            tenant_id: tenant.to_string(),
            description: Some("test".to_string()),
            reference: None,
            occurred_at: now,
            recorded_at: now,
            created_by: "tester".to_string(),
            reverses_entry_id: None,
            lines: vec![line(1, debit, amount, 0), line(2, credit, 0, amount)],
        }
    }

    #[tokio::test]
    async fn test_commit_applies_event_and_delta() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 10)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let held = uow
            .hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        assert_eq!(held.product(&p.id).unwrap().quantity_on_hand, 10);

        let m = movement(&p, MovementType::Out, 3);
        uow.insert_movement(&m).await.unwrap();
        let after = uow.apply_stock_delta("t-1", &p.id, -3).await.unwrap();
        assert_eq!(after, 7);
        uow.commit().await.unwrap();

        let stored = store.product("t-1", &p.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity_on_hand, 7);
        assert!(store.movement("t-1", &m.id).await.unwrap().is_some());
        assert!(store.holds().is_empty());
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 10)).await.unwrap();
        let m = movement(&p, MovementType::Out, 3);

        {
            let mut uow = store.begin().await.unwrap();
            uow.hold("t-1", HoldRequest::products([p.id.clone()]))
                .await
                .unwrap();
            uow.insert_movement(&m).await.unwrap();
            uow.apply_stock_delta("t-1", &p.id, -3).await.unwrap();
        }

        let stored = store.product("t-1", &p.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity_on_hand, 10);
        assert!(store.movement("t-1", &m.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_earlier_writes() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 2)).await.unwrap();
        let m = movement(&p, MovementType::Out, 5);

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        uow.insert_movement(&m).await.unwrap();

        // CHECK (quantity_on_hand >= 0)
        let err = uow.apply_stock_delta("t-1", &p.id, -5).await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)), "got {err:?}");
        uow.rollback().await.unwrap();

        let stored = store.product("t-1", &p.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity_on_hand, 2);
        assert!(store.movement("t-1", &m.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_require_hold() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 2)).await.unwrap();
        let other = store.insert_product(&product("t-1", "SKU-2", 2)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();

        let err = uow.apply_stock_delta("t-1", &other.id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionFailed(_)));

        let err = uow
            .hold("t-1", HoldRequest::products([other.id.clone()]))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::TransactionFailed(_)));
    }

    #[tokio::test]
    async fn test_hold_omits_missing_and_foreign_rows() {
        let store = store().await;
        let mine = store.insert_product(&product("t-1", "SKU-1", 1)).await.unwrap();
        let theirs = store.insert_product(&product("t-2", "SKU-1", 1)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let held = uow
            .hold(
                "t-1",
                HoldRequest::products([mine.id.clone(), theirs.id.clone(), "nope".to_string()]),
            )
            .await
            .unwrap();

        assert_eq!(held.products.len(), 1);
        assert!(held.product(&mine.id).is_some());
        assert!(held.product(&theirs.id).is_none());
    }

    #[tokio::test]
    async fn test_second_reversal_is_unique_violation() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 10)).await.unwrap();
        let original = movement(&p, MovementType::Out, 1);

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        uow.insert_movement(&original).await.unwrap();

        let mut first = movement(&p, MovementType::In, 1);
        first.reverses_movement_id = Some(original.id.clone());
        uow.insert_movement(&first).await.unwrap();

        let mut second = movement(&p, MovementType::In, 1);
        second.reverses_movement_id = Some(original.id.clone());
        let err = uow.insert_movement(&second).await.unwrap_err();

        match err {
            DbError::UniqueViolation { value, .. } => assert_eq!(value, original.id),
            other => panic!("expected UniqueViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_are_append_only() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 10)).await.unwrap();
        let m = movement(&p, MovementType::AdjustmentIn, 1);

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        uow.insert_movement(&m).await.unwrap();
        uow.commit().await.unwrap();

        let update = sqlx::query("UPDATE stock_movements SET quantity = 99 WHERE id = ?1")
            .bind(&m.id)
            .execute(store.database().pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM stock_movements WHERE id = ?1")
            .bind(&m.id)
            .execute(store.database().pool())
            .await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_journal_entry_roundtrip_and_totals() {
        let store = store().await;
        let cash = store
            .insert_account(&account("t-1", "1000", AccountKind::Asset))
            .await
            .unwrap();
        let sales = store
            .insert_account(&account("t-1", "4000", AccountKind::Revenue))
            .await
            .unwrap();
        let e = entry("t-1", &cash, &sales, 2500);

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::accounts([cash.id.clone(), sales.id.clone()]))
            .await
            .unwrap();
        uow.insert_journal_entry(&e).await.unwrap();
        uow.apply_account_delta("t-1", &cash.id, Money::from_minor(2500))
            .await
            .unwrap();
        uow.apply_account_delta("t-1", &sales.id, Money::from_minor(2500))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = store.journal_entry("t-1", &e.id).await.unwrap().unwrap();
        assert_eq!(stored.lines.len(), 2);
        assert_eq!(stored.total_debit(), stored.total_credit());

        let (debit, credit) = store.journal_totals("t-1").await.unwrap();
        assert_eq!(debit, Money::from_minor(2500));
        assert_eq!(debit, credit);

        let postings = store.account_postings("t-1", &cash.id).await.unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].debit_amount, Money::from_minor(2500));

        assert!(store.journal_entry("t-2", &e.id).await.unwrap().is_none());
        let (d2, _) = store.journal_totals("t-2").await.unwrap();
        assert!(d2.is_zero());
    }

    #[tokio::test]
    async fn test_duplicate_code_is_unique_violation() {
        let store = store().await;
        store.insert_product(&product("t-1", "SKU-1", 0)).await.unwrap();

        let err = store
            .insert_product(&product("t-1", "SKU-1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "SKU-1"));

        // Same code in another tenant is fine.
        store.insert_product(&product("t-2", "SKU-1", 0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_change_inside_scope() {
        let store = store().await;
        let p = store.insert_product(&product("t-1", "SKU-1", 0)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        let updated = uow
            .set_product_status("t-1", &p.id, LifecycleStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(updated.status, LifecycleStatus::Inactive);
        uow.commit().await.unwrap();

        let stored = store.product("t-1", &p.id).await.unwrap().unwrap();
        assert!(!stored.is_active());
    }
}
