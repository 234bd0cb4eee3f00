//! # In-Memory Store
//!
//! [`LedgerStore`] backed by maps behind one `RwLock`. Used by the engine's
//! test suite and by anything that wants a ledger without a database file.
//!
//! ## Scope Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  hold()     acquire holds, copy held rows into the scope                │
//! │  writes     mutate the copies, stage events (nobody else sees them)     │
//! │  commit()   write lock ─► re-check ─► apply copies + events ─► unlock   │
//! │             then release holds                                          │
//! │  drop       copies and staged events are discarded                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `fail_next_aggregate_write` makes the next `apply_*_delta` call fail,
//! which lets tests prove that a failure after the event write leaves no
//! trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::holds::{HoldGuard, HoldTable};
use super::{HeldRows, HeldSet, HoldRequest, LedgerStore, UnitOfWork};
use crate::error::{DbError, DbResult};
use crate::repository::journal::Posting;
use tally_core::{
    Account, AggregateKind, JournalEntry, LifecycleStatus, Money, Product, StockMovement,
    TransferLeg,
};

type Key = (String, String);

fn key(tenant_id: &str, id: &str) -> Key {
    (tenant_id.to_string(), id.to_string())
}

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<Key, Product>,
    accounts: BTreeMap<Key, Account>,
    movements: Vec<StockMovement>,
    entries: Vec<JournalEntry>,
}

impl MemoryState {
    fn movement_reversed(&self, tenant_id: &str, original_id: &str) -> bool {
        self.movements.iter().any(|m| {
            m.tenant_id == tenant_id && m.reverses_movement_id.as_deref() == Some(original_id)
        })
    }

    fn entry_reversed(&self, tenant_id: &str, original_id: &str) -> bool {
        self.entries.iter().any(|e| {
            e.tenant_id == tenant_id && e.reverses_entry_id.as_deref() == Some(original_id)
        })
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<MemoryState>,
    holds: Arc<HoldTable>,
    fail_next_aggregate_write: AtomicBool,
}

impl Shared {
    fn read(&self) -> DbResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| DbError::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> DbResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| DbError::Internal("memory store lock poisoned".to_string()))
    }
}

// =============================================================================
// Store
// =============================================================================

/// Ledger store that lives entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holds(&self) -> &Arc<HoldTable> {
        &self.shared.holds
    }

    /// Makes the next stock or balance delta inside any scope fail with
    /// `DbError::Internal`.
    pub fn fail_next_aggregate_write(&self) {
        self.shared
            .fail_next_aggregate_write
            .store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            guard: None,
            held: HeldSet::default(),
            products: HashMap::new(),
            accounts: HashMap::new(),
            movements: Vec::new(),
            entries: Vec::new(),
        }))
    }

    async fn product(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>> {
        Ok(self.shared.read()?.products.get(&key(tenant_id, id)).cloned())
    }

    async fn account(&self, tenant_id: &str, id: &str) -> DbResult<Option<Account>> {
        Ok(self.shared.read()?.accounts.get(&key(tenant_id, id)).cloned())
    }

    async fn movement(&self, tenant_id: &str, id: &str) -> DbResult<Option<StockMovement>> {
        let state = self.shared.read()?;
        Ok(state
            .movements
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.id == id)
            .cloned())
    }

    async fn movements_for_product(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let state = self.shared.read()?;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.product_id == product_id)
            .cloned()
            .collect();
        // Stable sort keeps commit order for equal timestamps.
        movements.sort_by(|a, b| {
            (a.occurred_at, a.recorded_at).cmp(&(b.occurred_at, b.recorded_at))
        });
        Ok(movements)
    }

    async fn transfer_legs(
        &self,
        tenant_id: &str,
        transfer_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let state = self.shared.read()?;
        let mut legs: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.transfer_id.as_deref() == Some(transfer_id))
            .cloned()
            .collect();
        legs.sort_by_key(|m| m.transfer_leg != Some(TransferLeg::Source));
        Ok(legs)
    }

    async fn journal_entry(&self, tenant_id: &str, id: &str) -> DbResult<Option<JournalEntry>> {
        let state = self.shared.read()?;
        Ok(state
            .entries
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.id == id)
            .cloned())
    }

    async fn account_postings(
        &self,
        tenant_id: &str,
        account_id: &str,
    ) -> DbResult<Vec<Posting>> {
        let state = self.shared.read()?;
        let mut postings: Vec<Posting> = state
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .flat_map(|e| {
                e.lines
                    .iter()
                    .filter(|l| l.account_id == account_id)
                    .map(move |l| Posting {
                        entry_id: e.id.clone(),
                        occurred_at: e.occurred_at,
                        debit_amount: l.debit_amount,
                        credit_amount: l.credit_amount,
                    })
            })
            .collect();
        postings.sort_by_key(|p| p.occurred_at);
        Ok(postings)
    }

    async fn journal_totals(&self, tenant_id: &str) -> DbResult<(Money, Money)> {
        let state = self.shared.read()?;
        let lines = state
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .flat_map(|e| e.lines.iter());

        let mut debit = Money::zero();
        let mut credit = Money::zero();
        for line in lines {
            debit = debit
                .checked_add(line.debit_amount)
                .ok_or_else(|| DbError::Internal("debit total overflow".to_string()))?;
            credit = credit
                .checked_add(line.credit_amount)
                .ok_or_else(|| DbError::Internal("credit total overflow".to_string()))?;
        }
        Ok((debit, credit))
    }

    async fn insert_product(&self, product: &Product) -> DbResult<Product> {
        let mut state = self.shared.write()?;
        let taken = state
            .products
            .values()
            .any(|p| p.tenant_id == product.tenant_id && p.code == product.code);
        if taken {
            return Err(DbError::duplicate("products.tenant_id, products.code", &product.code));
        }

        debug!(tenant_id = %product.tenant_id, code = %product.code, "Inserting product");
        state
            .products
            .insert(key(&product.tenant_id, &product.id), product.clone());
        Ok(product.clone())
    }

    async fn insert_account(&self, account: &Account) -> DbResult<Account> {
        let mut state = self.shared.write()?;
        let taken = state
            .accounts
            .values()
            .any(|a| a.tenant_id == account.tenant_id && a.code == account.code);
        if taken {
            return Err(DbError::duplicate("accounts.tenant_id, accounts.code", &account.code));
        }

        debug!(tenant_id = %account.tenant_id, code = %account.code, "Inserting account");
        state
            .accounts
            .insert(key(&account.tenant_id, &account.id), account.clone());
        Ok(account.clone())
    }

    async fn products_below_minimum(&self, tenant_id: &str) -> DbResult<Vec<Product>> {
        let state = self.shared.read()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.is_active() && p.needs_reorder())
            .cloned()
            .collect();
        products.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(products)
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// Working copies of the held rows plus staged events.
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    guard: Option<HoldGuard>,
    held: HeldSet,
    products: HashMap<String, Product>,
    accounts: HashMap<String, Account>,
    movements: Vec<StockMovement>,
    entries: Vec<JournalEntry>,
}

impl MemoryUnitOfWork {
    fn take_injected_fault(&self) -> DbResult<()> {
        if self
            .shared
            .fail_next_aggregate_write
            .swap(false, Ordering::SeqCst)
        {
            warn!("Injected aggregate write fault");
            return Err(DbError::Internal("injected fault".to_string()));
        }
        Ok(())
    }

    fn staged_movement_reversal(&self, original_id: &str) -> bool {
        self.movements
            .iter()
            .any(|m| m.reverses_movement_id.as_deref() == Some(original_id))
    }

    fn staged_entry_reversal(&self, original_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.reverses_entry_id.as_deref() == Some(original_id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn hold(&mut self, tenant_id: &str, request: HoldRequest) -> DbResult<HeldRows> {
        self.held.start(tenant_id, &request)?;

        let keys = request.keys(tenant_id);
        self.guard = Some(self.shared.holds.acquire(keys.clone()).await?);

        let state = self.shared.read()?;
        let mut rows = HeldRows::default();
        for k in &keys {
            match k.kind {
                AggregateKind::Product => {
                    if let Some(p) = state.products.get(&key(tenant_id, &k.id)) {
                        self.products.insert(p.id.clone(), p.clone());
                        rows.products.push(p.clone());
                    }
                }
                AggregateKind::Account => {
                    if let Some(a) = state.accounts.get(&key(tenant_id, &k.id)) {
                        self.accounts.insert(a.id.clone(), a.clone());
                        rows.accounts.push(a.clone());
                    }
                }
            }
        }

        Ok(rows)
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> DbResult<()> {
        self.held.check_product(&movement.tenant_id, &movement.product_id)?;

        let counterpart_missing = movement
            .counterpart_product_id
            .as_ref()
            .is_some_and(|id| !self.products.contains_key(id));
        if !self.products.contains_key(&movement.product_id) || counterpart_missing {
            return Err(DbError::ForeignKeyViolation {
                message: format!("movement {} references an unknown product", movement.id),
            });
        }

        if let Some(original) = &movement.reverses_movement_id {
            let committed = self
                .shared
                .read()?
                .movement_reversed(&movement.tenant_id, original);
            if committed || self.staged_movement_reversal(original) {
                return Err(DbError::duplicate(
                    "stock_movements.reverses_movement_id",
                    original,
                ));
            }
        }

        self.movements.push(movement.clone());
        Ok(())
    }

    async fn apply_stock_delta(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        delta: i64,
    ) -> DbResult<i64> {
        self.held.check_product(tenant_id, product_id)?;
        self.take_injected_fault()?;

        let product = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        let after = product
            .quantity_on_hand
            .checked_add(delta)
            .ok_or_else(|| DbError::QueryFailed("integer overflow".to_string()))?;
        if after < 0 {
            return Err(DbError::QueryFailed(
                "CHECK constraint failed: quantity_on_hand >= 0".to_string(),
            ));
        }

        product.quantity_on_hand = after;
        product.updated_at = Utc::now();
        Ok(after)
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> DbResult<()> {
        for line in &entry.lines {
            self.held.check_account(&entry.tenant_id, &line.account_id)?;
            if !self.accounts.contains_key(&line.account_id) {
                return Err(DbError::ForeignKeyViolation {
                    message: format!("line {} references an unknown account", line.id),
                });
            }
        }

        if let Some(original) = &entry.reverses_entry_id {
            let committed = self.shared.read()?.entry_reversed(&entry.tenant_id, original);
            if committed || self.staged_entry_reversal(original) {
                return Err(DbError::duplicate(
                    "journal_entries.reverses_entry_id",
                    original,
                ));
            }
        }

        self.entries.push(entry.clone());
        Ok(())
    }

    async fn apply_account_delta(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        delta: Money,
    ) -> DbResult<Money> {
        self.held.check_account(tenant_id, account_id)?;
        self.take_injected_fault()?;

        let account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| DbError::not_found("Account", account_id))?;
        let after = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| DbError::QueryFailed("integer overflow".to_string()))?;

        account.balance = after;
        account.updated_at = Utc::now();
        Ok(after)
    }

    async fn set_product_status(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        status: LifecycleStatus,
    ) -> DbResult<Product> {
        self.held.check_product(tenant_id, product_id)?;
        let product = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        product.status = status;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn set_account_status(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        status: LifecycleStatus,
    ) -> DbResult<Account> {
        self.held.check_account(tenant_id, account_id)?;
        let account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| DbError::not_found("Account", account_id))?;
        account.status = status;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let MemoryUnitOfWork {
            shared,
            guard,
            products,
            accounts,
            movements,
            entries,
            ..
        } = *self;

        {
            let mut state = shared.write()?;

            for m in &movements {
                if let Some(original) = &m.reverses_movement_id {
                    if state.movement_reversed(&m.tenant_id, original) {
                        return Err(DbError::duplicate(
                            "stock_movements.reverses_movement_id",
                            original,
                        ));
                    }
                }
            }
            for e in &entries {
                if let Some(original) = &e.reverses_entry_id {
                    if state.entry_reversed(&e.tenant_id, original) {
                        return Err(DbError::duplicate(
                            "journal_entries.reverses_entry_id",
                            original,
                        ));
                    }
                }
            }
            if let Some(p) = products.values().find(|p| p.quantity_on_hand < 0) {
                return Err(DbError::QueryFailed(format!(
                    "CHECK constraint failed: quantity_on_hand >= 0 ({})",
                    p.id
                )));
            }

            debug!(
                products = products.len(),
                accounts = accounts.len(),
                movements = movements.len(),
                entries = entries.len(),
                "Committing memory scope"
            );

            for (_, p) in products {
                state.products.insert(key(&p.tenant_id, &p.id), p);
            }
            for (_, a) in accounts {
                state.accounts.insert(key(&a.tenant_id, &a.id), a);
            }
            state.movements.extend(movements);
            state.entries.extend(entries);
        }

        drop(guard);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        drop(self);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::MovementType;

    fn product(tenant: &str, code: &str, qty: i64) -> Product {
        let now = Utc::now();
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            unit_price: Money::zero(),
            cost_price: Money::zero(),
            quantity_on_hand: qty,
            minimum_stock: 3,
            status: LifecycleStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn movement(p: &Product, quantity: i64) -> StockMovement {
        let now = Utc::now();
        StockMovement {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: p.tenant_id.clone(),
            product_id: p.id.clone(),
            movement_type: MovementType::Out,
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

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("t-1", "A", 10)).await.unwrap();
        let m = movement(&p, 4);

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        uow.insert_movement(&m).await.unwrap();
        uow.apply_stock_delta("t-1", &p.id, -4).await.unwrap();

        assert_eq!(store.product("t-1", &p.id).await.unwrap().unwrap().quantity_on_hand, 10);
        assert!(store.movement("t-1", &m.id).await.unwrap().is_none());

        uow.commit().await.unwrap();

        assert_eq!(store.product("t-1", &p.id).await.unwrap().unwrap().quantity_on_hand, 6);
        assert!(store.movement("t-1", &m.id).await.unwrap().is_some());
        assert!(store.holds().is_empty());
    }

    #[tokio::test]
    async fn test_injected_fault_discards_scope() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("t-1", "A", 10)).await.unwrap();
        let m = movement(&p, 4);

        store.fail_next_aggregate_write();
        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        uow.insert_movement(&m).await.unwrap();
        let err = uow.apply_stock_delta("t-1", &p.id, -4).await.unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));
        uow.rollback().await.unwrap();

        assert_eq!(store.product("t-1", &p.id).await.unwrap().unwrap().quantity_on_hand, 10);
        assert!(store.movement("t-1", &m.id).await.unwrap().is_none());

        // The fault fires once.
        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        assert_eq!(uow.apply_stock_delta("t-1", &p.id, -4).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_negative_stock_rejected() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("t-1", "A", 1)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        let err = uow.apply_stock_delta("t-1", &p.id, -2).await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_reversal_link_is_unique() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("t-1", "A", 10)).await.unwrap();
        let original = movement(&p, 1);

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        uow.insert_movement(&original).await.unwrap();
        let mut reversal = movement(&p, 1);
        reversal.reverses_movement_id = Some(original.id.clone());
        uow.insert_movement(&reversal).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.hold("t-1", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        let mut again = movement(&p, 1);
        again.reverses_movement_id = Some(original.id.clone());
        let err = uow.insert_movement(&again).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if *value == original.id));
    }

    #[tokio::test]
    async fn test_reads_are_tenant_scoped() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("t-1", "A", 1)).await.unwrap();

        assert!(store.product("t-2", &p.id).await.unwrap().is_none());

        let mut uow = store.begin().await.unwrap();
        let held = uow
            .hold("t-2", HoldRequest::products([p.id.clone()]))
            .await
            .unwrap();
        assert!(held.products.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_code_and_below_minimum() {
        let store = InMemoryStore::new();
        store.insert_product(&product("t-1", "B", 1)).await.unwrap();
        store.insert_product(&product("t-1", "A", 10)).await.unwrap();
        store.insert_product(&product("t-1", "C", 0)).await.unwrap();

        let err = store
            .insert_product(&product("t-1", "A", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let low: Vec<String> = store
            .products_below_minimum("t-1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.code)
            .collect();
        assert_eq!(low, vec!["B".to_string(), "C".to_string()]);
    }
}
