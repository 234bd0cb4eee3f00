//! # Ledger Engine
//!
//! The transactional executor. Owns the store, the notification channel and
//! the engine settings; the event-specific paths live in [`crate::stock`],
//! [`crate::journal`] and [`crate::reversal`].
//!
//! ## Scope Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  validate (pure) ──✗──► Validation, nothing touched                     │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  open_scope ─► stage (hold, fresh read, invariants, writes)             │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  close_scope:  Ok + ensure_live() ──► commit ──► publish notification   │
//! │                Err / Timeout / Cancelled ──► rollback, return error     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tally_core::invariants::{self, ConservationReport, EntryTotals};
use tally_core::validation::{validate_new_account, validate_new_product};
use tally_core::{
    Account, AggregateRef, JournalEntry, LifecycleStatus, Money, NewAccount, NewProduct,
    Product, StockMovement,
};
use tally_db::{EngineSettings, HoldRequest, LedgerStore, UnitOfWork};

use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::notify::{LedgerNotification, Notifier};

/// Applies events to aggregates, one atomic scope per event.
///
/// Cheap to clone; clones share the store and the notification channel.
pub struct LedgerEngine<S: LedgerStore> {
    pub(crate) store: Arc<S>,
    pub(crate) settings: EngineSettings,
    pub(crate) notifier: Notifier,
}

impl<S: LedgerStore> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        LedgerEngine {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        let notifier = Notifier::new(settings.notify_capacity);
        LedgerEngine {
            store: Arc::new(store),
            settings,
            notifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Notifications for every change committed from now on.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LedgerNotification> {
        self.notifier.subscribe()
    }

    // =========================================================================
    // Products & Accounts
    // =========================================================================

    /// Creates a product with zero stock.
    ///
    /// ## Returns
    /// * `Err(EngineError::DuplicateKey)` - the code is taken in this tenant
    pub async fn create_product(&self, tenant_id: &str, new: NewProduct) -> EngineResult<Product> {
        check_tenant(tenant_id)?;
        validate_new_product(&new)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            code: new.code.trim().to_string(),
            name: new.name.trim().to_string(),
            unit_price: new.unit_price,
            cost_price: new.cost_price,
            quantity_on_hand: 0,
            minimum_stock: new.minimum_stock,
            status: LifecycleStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let product = self.store.insert_product(&product).await?;
        info!(tenant_id = %tenant_id, product_id = %product.id, code = %product.code, "Product created");
        Ok(product)
    }

    /// Creates an account with a zero balance.
    ///
    /// ## Returns
    /// * `Err(EngineError::DuplicateKey)` - the code is taken in this tenant
    pub async fn create_account(&self, tenant_id: &str, new: NewAccount) -> EngineResult<Account> {
        check_tenant(tenant_id)?;
        validate_new_account(&new)?;

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            code: new.code.trim().to_string(),
            name: new.name.trim().to_string(),
            kind: new.kind,
            balance: Money::zero(),
            status: LifecycleStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let account = self.store.insert_account(&account).await?;
        info!(tenant_id = %tenant_id, account_id = %account.id, code = %account.code, "Account created");
        Ok(account)
    }

    /// Marks a product inactive. Movements against it are rejected from
    /// then on; its history stays. Deactivating twice is a no-op.
    pub async fn deactivate_product(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        product_id: &str,
    ) -> EngineResult<Product> {
        check_tenant(tenant_id)?;
        let ctx = self.scope_context(ctx);
        let mut uow = self.open_scope(&ctx).await?;

        let staged = ctx
            .run(stage_product_deactivation(uow.as_mut(), tenant_id, product_id))
            .await;

        let (product, changed) = self.close_scope(&ctx, uow, staged).await?;
        if changed {
            info!(tenant_id = %tenant_id, product_id = %product_id, "Product deactivated");
            self.notifier.publish(LedgerNotification::StatusChanged {
                tenant_id: tenant_id.to_string(),
                aggregate: AggregateRef::Product(product_id.to_string()),
                status: LifecycleStatus::Inactive,
            });
        }
        Ok(product)
    }

    /// Marks an account inactive. Deactivating twice is a no-op.
    pub async fn deactivate_account(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        account_id: &str,
    ) -> EngineResult<Account> {
        check_tenant(tenant_id)?;
        let ctx = self.scope_context(ctx);
        let mut uow = self.open_scope(&ctx).await?;

        let staged = ctx
            .run(stage_account_deactivation(uow.as_mut(), tenant_id, account_id))
            .await;

        let (account, changed) = self.close_scope(&ctx, uow, staged).await?;
        if changed {
            info!(tenant_id = %tenant_id, account_id = %account_id, "Account deactivated");
            self.notifier.publish(LedgerNotification::StatusChanged {
                tenant_id: tenant_id.to_string(),
                aggregate: AggregateRef::Account(account_id.to_string()),
                status: LifecycleStatus::Inactive,
            });
        }
        Ok(account)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn product(&self, tenant_id: &str, id: &str) -> EngineResult<Product> {
        self.store
            .product(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", id))
    }

    pub async fn account(&self, tenant_id: &str, id: &str) -> EngineResult<Account> {
        self.store
            .account(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("Account", id))
    }

    pub async fn movement(&self, tenant_id: &str, id: &str) -> EngineResult<StockMovement> {
        self.store
            .movement(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("StockMovement", id))
    }

    pub async fn journal_entry(&self, tenant_id: &str, id: &str) -> EngineResult<JournalEntry> {
        self.store
            .journal_entry(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("JournalEntry", id))
    }

    /// A product's movement history in business-time order.
    pub async fn movements_for_product(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> EngineResult<Vec<StockMovement>> {
        self.product(tenant_id, product_id).await?;
        Ok(self
            .store
            .movements_for_product(tenant_id, product_id)
            .await?)
    }

    /// Current value of an aggregate, or its value as of a business time.
    ///
    /// Without `as_of` this is the stored `quantity_on_hand` (products) or
    /// `balance` in minor units (accounts). With `as_of` it is recomputed
    /// from the events whose `occurred_at` is at or before `as_of`.
    pub async fn get_balance(
        &self,
        tenant_id: &str,
        aggregate: &AggregateRef,
        as_of: Option<DateTime<Utc>>,
    ) -> EngineResult<i64> {
        check_tenant(tenant_id)?;

        match aggregate {
            AggregateRef::Product(id) => {
                let product = self.product(tenant_id, id).await?;
                let Some(as_of) = as_of else {
                    return Ok(product.quantity_on_hand);
                };

                let movements = self.store.movements_for_product(tenant_id, id).await?;
                invariants::derive_quantity(movements.iter().filter(|m| m.occurred_at <= as_of))
                    .map_err(history_overflow)
            }
            AggregateRef::Account(id) => {
                let account = self.account(tenant_id, id).await?;
                let Some(as_of) = as_of else {
                    return Ok(account.balance.minor());
                };

                let postings = self.store.account_postings(tenant_id, id).await?;
                let deltas = postings
                    .iter()
                    .filter(|p| p.occurred_at <= as_of)
                    .map(|p| account.kind.balance_delta(p.debit_amount, p.credit_amount));

                let mut balance = Money::zero();
                for delta in deltas {
                    balance = delta
                        .and_then(|d| balance.checked_add(d))
                        .ok_or_else(|| overflow("account balance"))?;
                }
                Ok(balance.minor())
            }
        }
    }

    /// Active products whose stock is below their reorder threshold.
    pub async fn low_stock_products(&self, tenant_id: &str) -> EngineResult<Vec<Product>> {
        check_tenant(tenant_id)?;
        Ok(self.store.products_below_minimum(tenant_id).await?)
    }

    /// Compares stored stock with the signed sum of the movement history.
    pub async fn audit_product(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> EngineResult<ConservationReport> {
        let product = self.product(tenant_id, product_id).await?;
        let movements = self
            .store
            .movements_for_product(tenant_id, product_id)
            .await?;
        let report = invariants::audit_product(&product, &movements).map_err(history_overflow)?;

        if !report.is_conserved() {
            error!(
                tenant_id = %tenant_id,
                product_id = %product_id,
                stored = report.stored,
                derived = report.derived,
                "Stock does not match movement history"
            );
        }
        Ok(report)
    }

    /// Σ debit and Σ credit over every committed journal line of a tenant.
    pub async fn trial_balance(&self, tenant_id: &str) -> EngineResult<EntryTotals> {
        check_tenant(tenant_id)?;
        let (debit, credit) = self.store.journal_totals(tenant_id).await?;
        let totals = EntryTotals { debit, credit };
        if !totals.is_balanced() {
            error!(tenant_id = %tenant_id, debit = %debit, credit = %credit, "Trial balance is off");
        }
        Ok(totals)
    }

    // =========================================================================
    // Scope Helpers
    // =========================================================================

    /// The caller's context, with the configured default deadline if the
    /// caller set none.
    pub(crate) fn scope_context(&self, ctx: &RequestContext) -> RequestContext {
        ctx.or_default_deadline(self.settings.default_deadline())
    }

    pub(crate) async fn open_scope(
        &self,
        ctx: &RequestContext,
    ) -> EngineResult<Box<dyn UnitOfWork>> {
        ctx.run(async { self.store.begin().await.map_err(EngineError::from) })
            .await
    }

    /// Commits `uow` if staging succeeded and the request is still live,
    /// otherwise rolls it back and returns the error.
    pub(crate) async fn close_scope<T>(
        &self,
        ctx: &RequestContext,
        uow: Box<dyn UnitOfWork>,
        staged: EngineResult<T>,
    ) -> EngineResult<T> {
        let staged = staged.and_then(|value| {
            ctx.ensure_live()?;
            Ok(value)
        });

        match staged {
            Ok(value) => {
                uow.commit().await.map_err(|e| {
                    error!(error = %e, "Commit failed");
                    EngineError::from(e)
                })?;
                Ok(value)
            }
            Err(err) => {
                match &err {
                    EngineError::Storage(e) => warn!(error = %e, "Scope aborted by storage failure"),
                    EngineError::Timeout | EngineError::Cancelled => {
                        warn!(code = err.code(), "Scope abandoned")
                    }
                    other => debug!(code = other.code(), error = %other, "Scope rejected"),
                }
                if let Err(rollback) = uow.rollback().await {
                    warn!(error = %rollback, "Rollback failed; scope dropped");
                }
                Err(err)
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Returns the product and whether its status changed.
async fn stage_product_deactivation(
    uow: &mut dyn UnitOfWork,
    tenant_id: &str,
    product_id: &str,
) -> EngineResult<(Product, bool)> {
    let held = uow
        .hold(tenant_id, HoldRequest::products([product_id]))
        .await?;
    let product = held
        .product(product_id)
        .cloned()
        .ok_or_else(|| EngineError::not_found("Product", product_id))?;
    if !product.is_active() {
        return Ok((product, false));
    }

    let updated = uow
        .set_product_status(tenant_id, product_id, LifecycleStatus::Inactive)
        .await?;
    Ok((updated, true))
}

async fn stage_account_deactivation(
    uow: &mut dyn UnitOfWork,
    tenant_id: &str,
    account_id: &str,
) -> EngineResult<(Account, bool)> {
    let held = uow
        .hold(tenant_id, HoldRequest::accounts([account_id]))
        .await?;
    let account = held
        .account(account_id)
        .cloned()
        .ok_or_else(|| EngineError::not_found("Account", account_id))?;
    if !account.is_active() {
        return Ok((account, false));
    }

    let updated = uow
        .set_account_status(tenant_id, account_id, LifecycleStatus::Inactive)
        .await?;
    Ok((updated, true))
}

pub(crate) fn check_tenant(tenant_id: &str) -> EngineResult<()> {
    if tenant_id.trim().is_empty() {
        return Err(EngineError::required("tenant_id"));
    }
    Ok(())
}

/// Guards against the aggregate moving under a hold, which would mean the
/// store's hold is broken.
pub(crate) fn ensure_applied<T>(what: &str, id: &str, expected: T, actual: T) -> EngineResult<()>
where
    T: PartialEq + std::fmt::Display,
{
    if expected == actual {
        return Ok(());
    }
    error!(aggregate = what, id = %id, expected = %expected, actual = %actual, "Aggregate changed under hold");
    Err(EngineError::Storage(tally_db::DbError::Internal(format!(
        "{what} {id} changed under hold"
    ))))
}

/// An overflow while summing committed history is a storage fault, not a
/// problem with the request.
fn history_overflow(err: tally_core::CoreError) -> EngineError {
    error!(error = %err, "Stored history does not sum");
    EngineError::Storage(tally_db::DbError::Internal(err.to_string()))
}

fn overflow(context: &str) -> EngineError {
    history_overflow(tally_core::CoreError::AmountOverflow {
        context: context.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::AccountKind;
    use tally_db::InMemoryStore;

    fn engine() -> LedgerEngine<InMemoryStore> {
        LedgerEngine::new(InMemoryStore::new(), EngineSettings::default())
    }

    fn widget(code: &str) -> NewProduct {
        NewProduct {
            code: code.to_string(),
            name: "Widget".to_string(),
            unit_price: Money::from_minor(1500),
            cost_price: Money::from_minor(900),
            minimum_stock: 10,
        }
    }

    #[tokio::test]
    async fn test_create_product_starts_empty() {
        let engine = engine();
        let product = engine.create_product("t-1", widget(" W-1 ")).await.unwrap();

        assert_eq!(product.code, "W-1");
        assert_eq!(product.quantity_on_hand, 0);
        assert!(product.is_active());
        assert_eq!(engine.product("t-1", &product.id).await.unwrap(), product);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_duplicate_key() {
        let engine = engine();
        engine.create_product("t-1", widget("W-1")).await.unwrap();

        let err = engine.create_product("t-1", widget("W-1")).await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_KEY");

        engine.create_product("t-2", widget("W-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_new_product_reports_fields() {
        let engine = engine();
        let err = engine
            .create_product("t-1", NewProduct::default())
            .await
            .unwrap_err();

        match err {
            EngineError::Validation(errors) => {
                assert!(errors.has_field("code"));
                assert!(errors.has_field("name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_tenant_rejected() {
        let engine = engine();
        let err = engine.create_product("  ", widget("W-1")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent_and_notifies_once() {
        let engine = engine();
        let mut rx = engine.subscribe();
        let product = engine.create_product("t-1", widget("W-1")).await.unwrap();
        let ctx = RequestContext::new();

        let first = engine
            .deactivate_product(&ctx, "t-1", &product.id)
            .await
            .unwrap();
        let second = engine
            .deactivate_product(&ctx, "t-1", &product.id)
            .await
            .unwrap();
        assert_eq!(first.status, LifecycleStatus::Inactive);
        assert_eq!(second.status, LifecycleStatus::Inactive);

        assert!(matches!(
            rx.try_recv().unwrap(),
            LedgerNotification::StatusChanged { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deactivate_unknown_is_not_found() {
        let engine = engine();
        let err = engine
            .deactivate_account(&RequestContext::new(), "t-1", "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_account_and_read_balance() {
        let engine = engine();
        let account = engine
            .create_account(
                "t-1",
                NewAccount {
                    code: "1000".to_string(),
                    name: "Cash".to_string(),
                    kind: AccountKind::Asset,
                },
            )
            .await
            .unwrap();

        let balance = engine
            .get_balance("t-1", &AggregateRef::Account(account.id.clone()), None)
            .await
            .unwrap();
        assert_eq!(balance, 0);

        let err = engine
            .get_balance("t-2", &AggregateRef::Account(account.id), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reads_are_repeatable() {
        let engine = engine();
        let product = engine.create_product("t-1", widget("W-1")).await.unwrap();
        let aggregate = AggregateRef::Product(product.id.clone());

        let first = engine.get_balance("t-1", &aggregate, None).await.unwrap();
        let second = engine.get_balance("t-1", &aggregate, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            engine.product("t-1", &product.id).await.unwrap(),
            engine.product("t-1", &product.id).await.unwrap()
        );
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_shareable<T: Clone + Send + Sync + 'static>() {}
        assert_shareable::<LedgerEngine<InMemoryStore>>();
        assert_shareable::<LedgerEngine<tally_db::SqliteStore>>();
    }

    #[test]
    fn test_history_overflow_is_a_storage_fault() {
        let err = overflow("account balance");
        assert_eq!(err.code(), "STORAGE");
        assert!(!err.is_retryable());
        assert!(err.body().fields.is_empty());

        let err = history_overflow(tally_core::CoreError::AmountOverflow {
            context: "derived quantity".to_string(),
        });
        assert!(matches!(err, EngineError::Storage(tally_db::DbError::Internal(_))));
    }

    #[test]
    fn test_ensure_applied() {
        assert!(ensure_applied("product", "p-1", 5, 5).is_ok());
        let err = ensure_applied("product", "p-1", 5, 6).unwrap_err();
        assert_eq!(err.code(), "STORAGE");
    }
}
