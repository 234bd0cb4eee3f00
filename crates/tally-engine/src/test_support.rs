//! Fixtures shared by the engine's unit tests.
//!
//! Scenarios are written once against `LedgerEngine<S>` and run on both
//! stores. The SQLite fixture uses a file database so that several
//! connections (and so several scopes) can be open at once.

use tempfile::TempDir;

use tally_core::{
    Account, AccountKind, Money, MovementRequest, MovementType, NewAccount, NewProduct, Product,
};
use tally_db::{DbConfig, EngineSettings, InMemoryStore, LedgerStore, SqliteStore};

use crate::context::RequestContext;
use crate::engine::LedgerEngine;

pub(crate) const TENANT: &str = "t-1";
pub(crate) const OTHER_TENANT: &str = "t-2";
pub(crate) const ACTOR: &str = "tester";

pub(crate) fn memory_engine() -> LedgerEngine<InMemoryStore> {
    LedgerEngine::new(InMemoryStore::new(), EngineSettings::default())
}

/// Keeps the database directory alive for the duration of a test.
pub(crate) struct SqliteFixture {
    pub engine: LedgerEngine<SqliteStore>,
    _dir: TempDir,
}

pub(crate) async fn sqlite_fixture() -> SqliteFixture {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::new(dir.path().join("ledger.db")).max_connections(4);
    let store = SqliteStore::connect(config).await.unwrap();
    SqliteFixture {
        engine: LedgerEngine::new(store, EngineSettings::default()),
        _dir: dir,
    }
}

pub(crate) fn ctx() -> RequestContext {
    RequestContext::new()
}

/// Creates a product and brings it to `quantity` with an IN movement.
pub(crate) async fn product_with_stock<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    tenant_id: &str,
    code: &str,
    quantity: i64,
) -> Product {
    let product = engine
        .create_product(
            tenant_id,
            NewProduct {
                code: code.to_string(),
                name: format!("Product {code}"),
                unit_price: Money::from_minor(500),
                cost_price: Money::from_minor(300),
                minimum_stock: 10,
            },
        )
        .await
        .unwrap();

    if quantity > 0 {
        engine
            .apply_movement(
                &ctx(),
                tenant_id,
                MovementRequest::new(&product.id, MovementType::In, quantity, ACTOR),
            )
            .await
            .unwrap();
    }
    engine.product(tenant_id, &product.id).await.unwrap()
}

pub(crate) async fn account<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    tenant_id: &str,
    code: &str,
    kind: AccountKind,
) -> Account {
    engine
        .create_account(
            tenant_id,
            NewAccount {
                code: code.to_string(),
                name: format!("Account {code}"),
                kind,
            },
        )
        .await
        .unwrap()
}

pub(crate) async fn stock<S: LedgerStore>(engine: &LedgerEngine<S>, product_id: &str) -> i64 {
    engine
        .product(TENANT, product_id)
        .await
        .unwrap()
        .quantity_on_hand
}
