//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Pool-level reads and inserts (`ProductRepository`)
//! - Scope-level hold, delta and status updates (free functions taking the
//!   scope's connection)
//!
//! ## Delta Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                            │
//! │                                                                     │
//! │  ❌ WRONG: Absolute update                                          │
//! │     UPDATE products SET quantity_on_hand = 7 WHERE id = ?           │
//! │                                                                     │
//! │  ✅ CORRECT: Delta update                                           │
//! │     UPDATE products SET quantity_on_hand = quantity_on_hand - 3     │
//! │     ... RETURNING quantity_on_hand                                  │
//! │                                                                     │
//! │  The CHECK (quantity_on_hand >= 0) constraint backs up the          │
//! │  invariant checker if anything ever slips past it.                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{LifecycleStatus, Product};

const SELECT_PRODUCT: &str = r#"
    SELECT
        id, tenant_id, code, name,
        unit_price, cost_price,
        quantity_on_hand, minimum_stock,
        status, created_at, updated_at
    FROM products
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by id within a tenant.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, tenant_id, id).await
    }

    /// Active products whose stock is below their reorder threshold.
    pub async fn below_minimum(&self, tenant_id: &str) -> DbResult<Vec<Product>> {
        debug!(tenant_id = %tenant_id, "Listing products below minimum stock");

        let products = sqlx::query_as::<_, Product>(&format!(
            "{SELECT_PRODUCT}
             WHERE tenant_id = ?1
               AND status = 'active'
               AND quantity_on_hand < minimum_stock
             ORDER BY code"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - code already exists for the tenant
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(tenant_id = %product.tenant_id, code = %product.code, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, code, name,
                unit_price, cost_price,
                quantity_on_hand, minimum_stock,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(product.unit_price)
        .bind(product.cost_price)
        .bind(product.quantity_on_hand)
        .bind(product.minimum_stock)
        .bind(product.status)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| with_value(e.into(), &product.code))?;

        Ok(product.clone())
    }
}

// =============================================================================
// Scope Operations
// =============================================================================
// These run on the connection owned by an open atomic scope.

/// Reads a product row.
pub async fn fetch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "{SELECT_PRODUCT} WHERE tenant_id = ?1 AND id = ?2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Writes the row without changing it, which makes SQLite take the database
/// write lock for this transaction. Returns false if the row doesn't exist.
pub async fn touch(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE products SET quantity_on_hand = quantity_on_hand WHERE tenant_id = ?1 AND id = ?2",
    )
    .bind(tenant_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Adds `delta` to `quantity_on_hand`, returning the new value.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
    delta: i64,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    debug!(tenant_id = %tenant_id, product_id = %id, delta, "Applying stock delta");

    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET quantity_on_hand = quantity_on_hand + ?3,
            updated_at = ?4
        WHERE tenant_id = ?1 AND id = ?2
        RETURNING quantity_on_hand
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    updated.ok_or_else(|| DbError::not_found("Product", id))
}

/// Changes the lifecycle status, returning the updated row.
pub async fn set_status(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
    status: LifecycleStatus,
    now: DateTime<Utc>,
) -> DbResult<Product> {
    debug!(tenant_id = %tenant_id, product_id = %id, status = %status, "Setting product status");

    let result = sqlx::query(
        "UPDATE products SET status = ?3, updated_at = ?4 WHERE tenant_id = ?1 AND id = ?2",
    )
    .bind(tenant_id)
    .bind(id)
    .bind(status)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    fetch(conn, tenant_id, id)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

/// Fills in the offending value on a unique violation.
pub(crate) fn with_value(err: DbError, value: &str) -> DbError {
    match err {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: value.to_string(),
        },
        other => other,
    }
}
