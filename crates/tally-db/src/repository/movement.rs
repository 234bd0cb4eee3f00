//! # Stock Movement Repository
//!
//! Append-only access to `stock_movements`. There is no update or delete
//! here, and the schema triggers would reject one anyway.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::StockMovement;

const SELECT_MOVEMENT: &str = r#"
    SELECT
        id, tenant_id, product_id, movement_type, quantity, unit_cost,
        reference, note, occurred_at, recorded_at, created_by,
        transfer_id, transfer_leg, counterpart_product_id, reverses_movement_id
    FROM stock_movements
"#;

/// Repository for stock movement reads.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Gets a movement by id within a tenant.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<StockMovement>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, tenant_id, id).await
    }

    /// All movements of a product in business-time order.
    pub async fn for_product(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            "{SELECT_MOVEMENT}
             WHERE tenant_id = ?1 AND product_id = ?2
             ORDER BY occurred_at, recorded_at, rowid"
        ))
        .bind(tenant_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(product_id = %product_id, count = movements.len(), "Loaded product movements");
        Ok(movements)
    }

    /// Both legs of a transfer, source first.
    pub async fn transfer_legs(
        &self,
        tenant_id: &str,
        transfer_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let legs = sqlx::query_as::<_, StockMovement>(&format!(
            "{SELECT_MOVEMENT}
             WHERE tenant_id = ?1 AND transfer_id = ?2
             ORDER BY CASE transfer_leg WHEN 'source' THEN 0 ELSE 1 END"
        ))
        .bind(tenant_id)
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(legs)
    }
}

// =============================================================================
// Scope Operations
// =============================================================================

pub async fn fetch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<StockMovement>> {
    let movement = sqlx::query_as::<_, StockMovement>(&format!(
        "{SELECT_MOVEMENT} WHERE tenant_id = ?1 AND id = ?2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(movement)
}

/// Appends a movement row.
///
/// ## Returns
/// * `Err(DbError::UniqueViolation)` - the movement it reverses already has
///   a reversal
pub async fn insert(conn: &mut SqliteConnection, movement: &StockMovement) -> DbResult<()> {
    debug!(
        tenant_id = %movement.tenant_id,
        product_id = %movement.product_id,
        movement_type = %movement.movement_type,
        quantity = movement.quantity,
        "Inserting stock movement"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, tenant_id, product_id, movement_type, quantity, unit_cost,
            reference, note, occurred_at, recorded_at, created_by,
            transfer_id, transfer_leg, counterpart_product_id, reverses_movement_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.tenant_id)
    .bind(&movement.product_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.unit_cost)
    .bind(&movement.reference)
    .bind(&movement.note)
    .bind(movement.occurred_at)
    .bind(movement.recorded_at)
    .bind(&movement.created_by)
    .bind(&movement.transfer_id)
    .bind(movement.transfer_leg)
    .bind(&movement.counterpart_product_id)
    .bind(&movement.reverses_movement_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: movement
                .reverses_movement_id
                .clone()
                .unwrap_or_else(|| movement.id.clone()),
        },
        other => other,
    })?;

    Ok(())
}
