//! # Journal Repository
//!
//! Append-only access to `journal_entries` and `journal_lines`.
//!
//! ```text
//! journal_entries (1) ──── (N) journal_lines ──── (1) accounts
//!        │                         │
//!        └─ reverses_entry_id      └─ line_no 1..N, one side per line
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{JournalEntry, JournalLine, Money};

const SELECT_ENTRY: &str = r#"
    SELECT
        id, tenant_id, description, reference,
        occurred_at, recorded_at, created_by, reverses_entry_id
    FROM journal_entries
"#;

/// One journal line as seen from its account, with the entry's business time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Posting {
    pub entry_id: String,
    pub occurred_at: DateTime<Utc>,
    pub debit_amount: Money,
    pub credit_amount: Money,
}

/// Repository for journal reads.
#[derive(Debug, Clone)]
pub struct JournalRepository {
    pool: SqlitePool,
}

impl JournalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        JournalRepository { pool }
    }

    /// Gets an entry, with its lines, by id within a tenant.
    pub async fn get_entry(&self, tenant_id: &str, id: &str) -> DbResult<Option<JournalEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_entry(&mut conn, tenant_id, id).await
    }

    /// Every line posted to an account, oldest first.
    pub async fn postings_for_account(
        &self,
        tenant_id: &str,
        account_id: &str,
    ) -> DbResult<Vec<Posting>> {
        let postings = sqlx::query_as::<_, Posting>(
            r#"
            SELECT l.entry_id, e.occurred_at, l.debit_amount, l.credit_amount
            FROM journal_lines l
            INNER JOIN journal_entries e ON e.id = l.entry_id
            WHERE l.tenant_id = ?1 AND l.account_id = ?2
            ORDER BY e.occurred_at, l.entry_id, l.line_no
            "#,
        )
        .bind(tenant_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(account_id = %account_id, count = postings.len(), "Loaded account postings");
        Ok(postings)
    }

    /// Σ debit and Σ credit over every committed line of a tenant.
    pub async fn totals(&self, tenant_id: &str) -> DbResult<(Money, Money)> {
        let (debit, credit): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(debit_amount), 0), COALESCE(SUM(credit_amount), 0)
            FROM journal_lines
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((Money::from_minor(debit), Money::from_minor(credit)))
    }
}

// =============================================================================
// Scope Operations
// =============================================================================

/// Reads an entry and its lines.
pub async fn fetch_entry(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<JournalEntry>> {
    let entry = sqlx::query_as::<_, JournalEntry>(&format!(
        "{SELECT_ENTRY} WHERE tenant_id = ?1 AND id = ?2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(mut entry) = entry else {
        return Ok(None);
    };

    entry.lines = sqlx::query_as::<_, JournalLine>(
        r#"
        SELECT id, entry_id, line_no, account_id, debit_amount, credit_amount, memo
        FROM journal_lines
        WHERE tenant_id = ?1 AND entry_id = ?2
        ORDER BY line_no
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(entry))
}

/// Appends an entry and all of its lines.
pub async fn insert_entry(conn: &mut SqliteConnection, entry: &JournalEntry) -> DbResult<()> {
    debug!(
        tenant_id = %entry.tenant_id,
        entry_id = %entry.id,
        lines = entry.lines.len(),
        "Inserting journal entry"
    );

    sqlx::query(
        r#"
        INSERT INTO journal_entries (
            id, tenant_id, description, reference,
            occurred_at, recorded_at, created_by, reverses_entry_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.description)
    .bind(&entry.reference)
    .bind(entry.occurred_at)
    .bind(entry.recorded_at)
    .bind(&entry.created_by)
    .bind(&entry.reverses_entry_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: entry
                .reverses_entry_id
                .clone()
                .unwrap_or_else(|| entry.id.clone()),
        },
        other => other,
    })?;

    for line in &entry.lines {
        sqlx::query(
            r#"
            INSERT INTO journal_lines (
                id, tenant_id, entry_id, line_no, account_id,
                debit_amount, credit_amount, memo
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&line.id)
        .bind(&entry.tenant_id)
        .bind(&line.entry_id)
        .bind(line.line_no)
        .bind(&line.account_id)
        .bind(line.debit_amount)
        .bind(line.credit_amount)
        .bind(&line.memo)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
