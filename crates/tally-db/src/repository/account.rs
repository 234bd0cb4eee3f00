//! # Account Repository
//!
//! Database operations for ledger accounts. Mirrors the product repository:
//! pool-level reads and inserts, scope-level hold, delta and status updates.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::product::with_value;
use tally_core::{Account, LifecycleStatus, Money};

const SELECT_ACCOUNT: &str = r#"
    SELECT
        id, tenant_id, code, name, kind,
        balance, status, created_at, updated_at
    FROM accounts
"#;

/// Repository for account database operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Gets an account by id within a tenant.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<Account>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, tenant_id, id).await
    }

    /// Inserts a new account.
    pub async fn insert(&self, account: &Account) -> DbResult<Account> {
        debug!(tenant_id = %account.tenant_id, code = %account.code, "Inserting account");

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, tenant_id, code, name, kind,
                balance, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&account.id)
        .bind(&account.tenant_id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.kind)
        .bind(account.balance)
        .bind(account.status)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| with_value(e.into(), &account.code))?;

        Ok(account.clone())
    }
}

// =============================================================================
// Scope Operations
// =============================================================================

pub async fn fetch(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "{SELECT_ACCOUNT} WHERE tenant_id = ?1 AND id = ?2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// No-op write that takes SQLite's write lock. False if the row is missing.
pub async fn touch(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<bool> {
    let result =
        sqlx::query("UPDATE accounts SET balance = balance WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// Adds `delta` to `balance`, returning the new balance.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
    delta: Money,
    now: DateTime<Utc>,
) -> DbResult<Money> {
    debug!(tenant_id = %tenant_id, account_id = %id, delta = %delta, "Applying balance delta");

    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE accounts
        SET balance = balance + ?3,
            updated_at = ?4
        WHERE tenant_id = ?1 AND id = ?2
        RETURNING balance
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    updated
        .map(Money::from_minor)
        .ok_or_else(|| DbError::not_found("Account", id))
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
    status: LifecycleStatus,
    now: DateTime<Utc>,
) -> DbResult<Account> {
    debug!(tenant_id = %tenant_id, account_id = %id, status = %status, "Setting account status");

    let result = sqlx::query(
        "UPDATE accounts SET status = ?3, updated_at = ?4 WHERE tenant_id = ?1 AND id = ?2",
    )
    .bind(tenant_id)
    .bind(id)
    .bind(status)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Account", id));
    }

    fetch(conn, tenant_id, id)
        .await?
        .ok_or_else(|| DbError::not_found("Account", id))
}
