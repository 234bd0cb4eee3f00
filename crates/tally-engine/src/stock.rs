//! # Stock Movements
//!
//! `apply_movement`: one movement (or the two legs of a transfer) and the
//! matching `quantity_on_hand` change, in one scope.
//!
//! ## Transfer Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TRANSFER 10 from A to B                                                │
//! │                                                                         │
//! │  hold(A, B)            sorted, one call                                 │
//! │  plan_transfer         OUT 10 on A, then IN 10 on B, both must pass     │
//! │  insert source leg     product A, counterpart B, transfer_id T          │
//! │  insert dest leg       product B, counterpart A, transfer_id T          │
//! │  A -= 10, B += 10                                                       │
//! │  commit                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use tally_core::invariants::{self, StockPlan};
use tally_core::validation::validate_movement;
use tally_core::{MovementRequest, Product, StockMovement, TransferLeg};
use tally_db::{HoldRequest, LedgerStore, UnitOfWork};

use crate::context::RequestContext;
use crate::engine::{check_tenant, ensure_applied, LedgerEngine};
use crate::error::{EngineError, EngineResult};
use crate::notify::LedgerNotification;

/// Which committed rows the new rows compensate, if any.
///
/// `primary` links the row on `request.product_id` (the source leg of a
/// transfer); `destination` links the destination leg.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReversalLinks {
    pub primary: Option<String>,
    pub destination: Option<String>,
}

/// One written movement row with the stock change it caused.
#[derive(Debug, Clone)]
pub(crate) struct AppliedLeg {
    pub movement: StockMovement,
    pub plan: StockPlan,
    pub minimum_stock: i64,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Records a stock movement and updates the product's stock.
    ///
    /// For `TRANSFER` both legs are written and the source leg is returned;
    /// its `transfer_id` and `counterpart_product_id` lead to the other leg.
    ///
    /// ## Returns
    /// * `Err(EngineError::Validation)` - the request is malformed
    /// * `Err(EngineError::InvalidProduct)` - product missing, foreign or inactive
    /// * `Err(EngineError::InsufficientStock)` - stock would go negative
    /// * `Err(EngineError::Timeout | Cancelled)` - gave up before commit
    pub async fn apply_movement(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        request: MovementRequest,
    ) -> EngineResult<StockMovement> {
        check_tenant(tenant_id)?;
        validate_movement(&request)?;

        let legs = self
            .run_movement(ctx, tenant_id, &request, ReversalLinks::default())
            .await?;
        first_leg(legs)
    }

    /// Shared by `apply_movement` and `reverse_movement`.
    pub(crate) async fn run_movement(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        request: &MovementRequest,
        links: ReversalLinks,
    ) -> EngineResult<Vec<AppliedLeg>> {
        let ctx = self.scope_context(ctx);
        let mut uow = self.open_scope(&ctx).await?;

        let staged = ctx
            .run(stage_movement(uow.as_mut(), tenant_id, request, links))
            .await;
        let legs = self.close_scope(&ctx, uow, staged).await?;

        for leg in &legs {
            info!(
                tenant_id = %tenant_id,
                movement_id = %leg.movement.id,
                product_id = %leg.movement.product_id,
                movement_type = %leg.movement.movement_type,
                before = leg.plan.before,
                after = leg.plan.after,
                "Stock movement committed"
            );
        }
        self.publish_movement(tenant_id, &legs);
        Ok(legs)
    }

    fn publish_movement(&self, tenant_id: &str, legs: &[AppliedLeg]) {
        for leg in legs {
            let m = &leg.movement;
            self.notifier.publish(LedgerNotification::MovementApplied {
                tenant_id: tenant_id.to_string(),
                movement_id: m.id.clone(),
                product_id: m.product_id.clone(),
                movement_type: m.movement_type,
                quantity: m.quantity,
                quantity_on_hand: leg.plan.after,
                transfer_id: m.transfer_id.clone(),
                reverses_movement_id: m.reverses_movement_id.clone(),
            });

            if leg.plan.before >= leg.minimum_stock && leg.plan.after < leg.minimum_stock {
                self.notifier.publish(LedgerNotification::LowStock {
                    tenant_id: tenant_id.to_string(),
                    product_id: m.product_id.clone(),
                    quantity_on_hand: leg.plan.after,
                    minimum_stock: leg.minimum_stock,
                });
            }
        }
    }
}

pub(crate) fn first_leg(legs: Vec<AppliedLeg>) -> EngineResult<StockMovement> {
    legs.into_iter()
        .next()
        .map(|leg| leg.movement)
        .ok_or_else(|| {
            EngineError::Storage(tally_db::DbError::Internal(
                "movement scope committed no rows".to_string(),
            ))
        })
}

// =============================================================================
// Staging
// =============================================================================

async fn stage_movement(
    uow: &mut dyn UnitOfWork,
    tenant_id: &str,
    request: &MovementRequest,
    links: ReversalLinks,
) -> EngineResult<Vec<AppliedLeg>> {
    let now = Utc::now();

    let Some(direction) = request.movement_type.direction() else {
        return stage_transfer(uow, tenant_id, request, links, now).await;
    };

    let held = uow
        .hold(tenant_id, HoldRequest::products([request.product_id.as_str()]))
        .await?;
    let product = held_product(&held.products, &request.product_id)?;
    let plan = invariants::plan_stock_change(product, direction, request.quantity)?;

    let movement = movement_row(tenant_id, request, &request.product_id, now, None, links.primary);
    uow.insert_movement(&movement).await?;
    let after = uow
        .apply_stock_delta(tenant_id, &product.id, plan.delta)
        .await?;
    ensure_applied("product", &product.id, plan.after, after)?;

    Ok(vec![AppliedLeg {
        movement,
        plan,
        minimum_stock: product.minimum_stock,
    }])
}

async fn stage_transfer(
    uow: &mut dyn UnitOfWork,
    tenant_id: &str,
    request: &MovementRequest,
    links: ReversalLinks,
    now: DateTime<Utc>,
) -> EngineResult<Vec<AppliedLeg>> {
    let source_id = request.product_id.as_str();
    let destination_id = request
        .destination_product_id
        .as_deref()
        .ok_or_else(|| EngineError::required("destination_product_id"))?;

    let held = uow
        .hold(tenant_id, HoldRequest::products([source_id, destination_id]))
        .await?;
    let source = held_product(&held.products, source_id)?;
    let destination = held_product(&held.products, destination_id)?;
    let (out, inbound) = invariants::plan_transfer(source, destination, request.quantity)?;

    let transfer_id = Uuid::new_v4().to_string();
    let source_leg = movement_row(
        tenant_id,
        request,
        source_id,
        now,
        Some((&transfer_id, TransferLeg::Source, destination_id)),
        links.primary,
    );
    let destination_leg = movement_row(
        tenant_id,
        request,
        destination_id,
        now,
        Some((&transfer_id, TransferLeg::Destination, source_id)),
        links.destination,
    );

    uow.insert_movement(&source_leg).await?;
    uow.insert_movement(&destination_leg).await?;

    let after = uow.apply_stock_delta(tenant_id, source_id, out.delta).await?;
    ensure_applied("product", source_id, out.after, after)?;
    let after = uow
        .apply_stock_delta(tenant_id, destination_id, inbound.delta)
        .await?;
    ensure_applied("product", destination_id, inbound.after, after)?;

    Ok(vec![
        AppliedLeg {
            movement: source_leg,
            plan: out,
            minimum_stock: source.minimum_stock,
        },
        AppliedLeg {
            movement: destination_leg,
            plan: inbound,
            minimum_stock: destination.minimum_stock,
        },
    ])
}

/// A product absent from the held rows doesn't exist for this tenant.
fn held_product<'a>(held: &'a [Product], id: &str) -> EngineResult<&'a Product> {
    held.iter()
        .find(|p| p.id == id)
        .ok_or_else(|| EngineError::InvalidProduct {
            product_id: id.to_string(),
        })
}

fn movement_row(
    tenant_id: &str,
    request: &MovementRequest,
    product_id: &str,
    now: DateTime<Utc>,
    transfer: Option<(&str, TransferLeg, &str)>,
    reverses: Option<String>,
) -> StockMovement {
    StockMovement {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        product_id: product_id.to_string(),
        movement_type: request.movement_type,
        quantity: request.quantity,
        unit_cost: request.unit_cost,
        reference: request.reference.clone(),
        note: request.note.clone(),
        occurred_at: request.occurred_at.unwrap_or(now),
        recorded_at: now,
        created_by: request.created_by.trim().to_string(),
        transfer_id: transfer.map(|(id, _, _)| id.to_string()),
        transfer_leg: transfer.map(|(_, leg, _)| leg),
        counterpart_product_id: transfer.map(|(_, _, other)| other.to_string()),
        reverses_movement_id: reverses,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::context::cancel_pair;
    use crate::test_support::*;
    use tally_core::{AggregateRef, MovementType};
    use tally_db::InMemoryStore;

    fn out(product_id: &str, quantity: i64) -> MovementRequest {
        MovementRequest::new(product_id, MovementType::Out, quantity, ACTOR)
    }

    /// Opens a scope outside the engine and holds `product_id` in it.
    async fn block_product<S: LedgerStore>(
        engine: &LedgerEngine<S>,
        product_id: &str,
    ) -> Box<dyn UnitOfWork> {
        let mut uow = engine.store().begin().await.unwrap();
        uow.hold(TENANT, HoldRequest::products([product_id]))
            .await
            .unwrap();
        uow
    }

    // -------------------------------------------------------------------------
    // Scenarios, run on both stores
    // -------------------------------------------------------------------------

    async fn conservation<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let product = product_with_stock(engine, TENANT, "W-1", 100).await;

        let movement = engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 30))
            .await
            .unwrap();
        assert_eq!(movement.movement_type, MovementType::Out);
        assert_eq!(movement.quantity, 30);
        assert_eq!(stock(engine, &product.id).await, 70);

        let err = engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 80))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock {
                available: 70,
                requested: 80,
                ..
            }
        ));
        assert_eq!(stock(engine, &product.id).await, 70);

        let history = engine
            .movements_for_product(TENANT, &product.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(engine
            .audit_product(TENANT, &product.id)
            .await
            .unwrap()
            .is_conserved());
    }

    async fn rejects_bad_products<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let mine = product_with_stock(engine, TENANT, "W-1", 10).await;
        let theirs = product_with_stock(engine, OTHER_TENANT, "W-1", 10).await;

        let err = engine
            .apply_movement(&ctx(), TENANT, out("missing", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PRODUCT");

        let err = engine
            .apply_movement(&ctx(), TENANT, out(&theirs.id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PRODUCT");
        assert_eq!(
            engine.product(OTHER_TENANT, &theirs.id).await.unwrap().quantity_on_hand,
            10
        );

        engine
            .deactivate_product(&ctx(), TENANT, &mine.id)
            .await
            .unwrap();
        let err = engine
            .apply_movement(&ctx(), TENANT, out(&mine.id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PRODUCT");
        assert_eq!(stock(engine, &mine.id).await, 10);
    }

    async fn transfer<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let a = product_with_stock(engine, TENANT, "A", 50).await;
        let b = product_with_stock(engine, TENANT, "B", 0).await;

        let source = engine
            .apply_movement(
                &ctx(),
                TENANT,
                MovementRequest::transfer(&a.id, &b.id, 20, ACTOR),
            )
            .await
            .unwrap();
        assert_eq!(source.product_id, a.id);
        assert_eq!(source.transfer_leg, Some(TransferLeg::Source));
        assert_eq!(source.counterpart_product_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(stock(engine, &a.id).await, 30);
        assert_eq!(stock(engine, &b.id).await, 20);

        let transfer_id = source.transfer_id.clone().unwrap();
        let legs = engine
            .store()
            .transfer_legs(TENANT, &transfer_id)
            .await
            .unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[1].product_id, b.id);
        assert_eq!(legs[1].transfer_leg, Some(TransferLeg::Destination));

        let err = engine
            .apply_movement(
                &ctx(),
                TENANT,
                MovementRequest::transfer(&a.id, &b.id, 40, ACTOR),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert_eq!(stock(engine, &a.id).await, 30);
        assert_eq!(stock(engine, &b.id).await, 20);

        assert!(engine.audit_product(TENANT, &a.id).await.unwrap().is_conserved());
        assert!(engine.audit_product(TENANT, &b.id).await.unwrap().is_conserved());
    }

    async fn timeout_while_held<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let product = product_with_stock(engine, TENANT, "W-1", 100).await;
        let blocker = block_product(engine, &product.id).await;

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));
        let err = engine
            .apply_movement(&ctx, TENANT, out(&product.id, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
        assert!(err.is_retryable());

        blocker.rollback().await.unwrap();
        assert_eq!(stock(engine, &product.id).await, 100);
        let history = engine
            .movements_for_product(TENANT, &product.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    async fn cancel_while_held<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let product = product_with_stock(engine, TENANT, "W-1", 100).await;
        let blocker = block_product(engine, &product.id).await;
        let (handle, signal) = cancel_pair();
        let ctx = RequestContext::new().with_cancel(signal);

        let apply = engine.apply_movement(&ctx, TENANT, out(&product.id, 10));
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(apply, cancel);
        assert!(matches!(result, Err(EngineError::Cancelled)));

        blocker.rollback().await.unwrap();
        assert_eq!(stock(engine, &product.id).await, 100);
    }

    async fn notifies_after_commit<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let product = product_with_stock(engine, TENANT, "W-1", 15).await;
        let mut rx = engine.subscribe();
        let blocker = block_product(engine, &product.id).await;

        let request_ctx = ctx();
        let apply = engine.apply_movement(&request_ctx, TENANT, out(&product.id, 10));
        let release = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(rx.try_recv().is_err());
            blocker.rollback().await.unwrap();
        };
        let (applied, ()) = tokio::join!(apply, release);
        let applied = applied.unwrap();

        match rx.try_recv().unwrap() {
            LedgerNotification::MovementApplied {
                movement_id,
                quantity_on_hand,
                ..
            } => {
                assert_eq!(movement_id, applied.id);
                assert_eq!(quantity_on_hand, 5);
            }
            other => panic!("expected movement notification, got {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            LedgerNotification::LowStock {
                quantity_on_hand: 5,
                minimum_stock: 10,
                ..
            }
        ));

        // Already below the threshold: no second LowStock
        engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 1))
            .await
            .unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            LedgerNotification::MovementApplied { .. }
        ));
        assert!(rx.try_recv().is_err());

        // Rejected: nothing published
        engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 100))
            .await
            .unwrap_err();
        assert!(rx.try_recv().is_err());

        let low = engine.low_stock_products(TENANT).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, product.id);
    }

    async fn balance_as_of<S: LedgerStore>(engine: &LedgerEngine<S>) {
        let product = product_with_stock(engine, TENANT, "W-1", 0).await;
        let now = Utc::now();
        let at = |days: i64| now - ChronoDuration::days(days);

        for request in [
            MovementRequest::new(&product.id, MovementType::In, 100, ACTOR).occurred_at(at(3)),
            out(&product.id, 30).occurred_at(at(2)),
            MovementRequest::new(&product.id, MovementType::AdjustmentIn, 5, ACTOR)
                .occurred_at(at(1)),
        ] {
            engine.apply_movement(&ctx(), TENANT, request).await.unwrap();
        }

        let aggregate = AggregateRef::Product(product.id.clone());
        let expectations = [
            (None, 75),
            (Some(at(4)), 0),
            (Some(at(3)), 100),
            (Some(at(2) + ChronoDuration::hours(1)), 70),
            (Some(now), 75),
        ];
        for (as_of, expected) in expectations {
            let balance = engine.get_balance(TENANT, &aggregate, as_of).await.unwrap();
            assert_eq!(balance, expected, "as of {as_of:?}");
        }
    }

    async fn concurrent_outflows<S: LedgerStore>(engine: LedgerEngine<S>) {
        let product = product_with_stock(&engine, TENANT, "W-1", 100).await;

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let product_id = product.id.clone();
                tokio::spawn(async move {
                    engine
                        .apply_movement(&ctx(), TENANT, out(&product_id, 60))
                        .await
                })
            })
            .collect();

        let mut applied = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => applied += 1,
                Err(EngineError::InsufficientStock { available: 40, .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((applied, rejected), (1, 1));
        assert_eq!(stock(&engine, &product.id).await, 40);
        assert!(engine
            .audit_product(TENANT, &product.id)
            .await
            .unwrap()
            .is_conserved());
    }

    async fn opposing_transfers<S: LedgerStore>(engine: LedgerEngine<S>) {
        let a = product_with_stock(&engine, TENANT, "A", 500).await;
        let b = product_with_stock(&engine, TENANT, "B", 500).await;

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let engine = engine.clone();
                let (from, to) = if i % 2 == 0 {
                    (a.id.clone(), b.id.clone())
                } else {
                    (b.id.clone(), a.id.clone())
                };
                tokio::spawn(async move {
                    engine
                        .apply_movement(&ctx(), TENANT, MovementRequest::transfer(&from, &to, 5, ACTOR))
                        .await
                })
            })
            .collect();

        for task in tasks {
            if let Err(err) = task.await.unwrap() {
                panic!("transfer failed: {err:?}");
            }
        }
        // Ten each way
        assert_eq!(stock(&engine, &a.id).await, 500);
        assert_eq!(stock(&engine, &b.id).await, 500);
        for product in [&a, &b] {
            let history = engine
                .movements_for_product(TENANT, &product.id)
                .await
                .unwrap();
            assert_eq!(history.len(), 21);
            assert!(engine
                .audit_product(TENANT, &product.id)
                .await
                .unwrap()
                .is_conserved());
        }
    }

    // -------------------------------------------------------------------------
    // In-memory store
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_memory_conservation() {
        conservation(&memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_rejects_bad_products() {
        rejects_bad_products(&memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_transfer() {
        transfer(&memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_timeout_while_held() {
        timeout_while_held(&memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_cancel_while_held() {
        cancel_while_held(&memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_notifies_after_commit() {
        notifies_after_commit(&memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_balance_as_of() {
        balance_as_of(&memory_engine()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_concurrent_outflows() {
        concurrent_outflows(memory_engine()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_opposing_transfers_complete() {
        opposing_transfers(memory_engine()).await;
    }

    #[tokio::test]
    async fn test_memory_failed_write_leaves_no_trace() {
        let store = InMemoryStore::new();
        let engine = LedgerEngine::new(store.clone(), Default::default());
        let product = product_with_stock(&engine, TENANT, "W-1", 100).await;
        let mut rx = engine.subscribe();

        store.fail_next_aggregate_write();
        let err = engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 10))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE");

        assert_eq!(stock(&engine, &product.id).await, 100);
        let history = engine
            .movements_for_product(TENANT, &product.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_memory_failed_transfer_moves_nothing() {
        let store = InMemoryStore::new();
        let engine = LedgerEngine::new(store.clone(), Default::default());
        let a = product_with_stock(&engine, TENANT, "A", 50).await;
        let b = product_with_stock(&engine, TENANT, "B", 0).await;

        store.fail_next_aggregate_write();
        let err = engine
            .apply_movement(&ctx(), TENANT, MovementRequest::transfer(&a.id, &b.id, 20, ACTOR))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE");

        assert_eq!(stock(&engine, &a.id).await, 50);
        assert_eq!(stock(&engine, &b.id).await, 0);
        assert!(engine
            .movements_for_product(TENANT, &b.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_validation_runs_before_anything() {
        let engine = memory_engine();
        let product = product_with_stock(&engine, TENANT, "W-1", 10).await;

        let err = engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = engine
            .apply_movement(&ctx(), "", out(&product.id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(stock(&engine, &product.id).await, 10);
    }

    // -------------------------------------------------------------------------
    // SQLite store
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_sqlite_conservation() {
        conservation(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test]
    async fn test_sqlite_rejects_bad_products() {
        rejects_bad_products(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test]
    async fn test_sqlite_transfer() {
        transfer(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test]
    async fn test_sqlite_timeout_while_held() {
        timeout_while_held(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test]
    async fn test_sqlite_cancel_while_held() {
        cancel_while_held(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test]
    async fn test_sqlite_notifies_after_commit() {
        notifies_after_commit(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test]
    async fn test_sqlite_balance_as_of() {
        balance_as_of(&sqlite_fixture().await.engine).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_concurrent_outflows() {
        let fixture = sqlite_fixture().await;
        concurrent_outflows(fixture.engine.clone()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_opposing_transfers_complete() {
        let fixture = sqlite_fixture().await;
        opposing_transfers(fixture.engine.clone()).await;
    }

    #[tokio::test]
    async fn test_sqlite_failed_write_leaves_no_trace() {
        let fixture = sqlite_fixture().await;
        let engine = &fixture.engine;
        let product = product_with_stock(engine, TENANT, "W-1", 100).await;

        sqlx::query(
            "CREATE TRIGGER fail_stock_write BEFORE UPDATE OF quantity_on_hand ON products \
             WHEN NEW.quantity_on_hand <> OLD.quantity_on_hand \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END",
        )
        .execute(engine.store().database().pool())
        .await
        .unwrap();

        let err = engine
            .apply_movement(&ctx(), TENANT, out(&product.id, 10))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE");

        assert_eq!(stock(engine, &product.id).await, 100);
        let history = engine
            .movements_for_product(TENANT, &product.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }
}
