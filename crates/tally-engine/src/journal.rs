//! # Journal Entries
//!
//! `post_journal_entry`: one balanced entry, its lines, and the balance
//! change of every account it touches, in one scope.
//!
//! ```text
//!   lines ─► hold(accounts, sorted) ─► Σ debit == Σ credit ?
//!                                     └─► per-account delta by normal side
//!                                         ─► insert entry + lines
//!                                         ─► balance += delta per account
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tally_core::invariants::{self, AccountPlan, EntryTotals};
use tally_core::validation::validate_journal_entry;
use tally_core::{JournalEntry, JournalEntryRequest, JournalLine};
use tally_db::{HoldRequest, LedgerStore, UnitOfWork};

use crate::context::RequestContext;
use crate::engine::{check_tenant, ensure_applied, LedgerEngine};
use crate::error::EngineResult;
use crate::notify::LedgerNotification;

/// A written entry with its totals and the account changes it caused.
#[derive(Debug, Clone)]
pub(crate) struct PostedEntry {
    pub entry: JournalEntry,
    pub totals: EntryTotals,
    pub plans: Vec<AccountPlan>,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Posts a balanced journal entry and updates the account balances.
    ///
    /// ## Returns
    /// * `Err(EngineError::Validation)` - the request is malformed
    /// * `Err(EngineError::InvalidAccount)` - a line's account is missing,
    ///   foreign or inactive
    /// * `Err(EngineError::UnbalancedEntry)` - Σ debit != Σ credit
    pub async fn post_journal_entry(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        request: JournalEntryRequest,
    ) -> EngineResult<JournalEntry> {
        check_tenant(tenant_id)?;
        validate_journal_entry(&request)?;

        let posted = self.run_entry(ctx, tenant_id, &request, None).await?;
        Ok(posted.entry)
    }

    /// Shared by `post_journal_entry` and `reverse_entry`.
    pub(crate) async fn run_entry(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        request: &JournalEntryRequest,
        reverses: Option<String>,
    ) -> EngineResult<PostedEntry> {
        let ctx = self.scope_context(ctx);
        let mut uow = self.open_scope(&ctx).await?;

        let staged = ctx
            .run(stage_entry(uow.as_mut(), tenant_id, request, reverses))
            .await;
        let posted = self.close_scope(&ctx, uow, staged).await?;

        info!(
            tenant_id = %tenant_id,
            entry_id = %posted.entry.id,
            lines = posted.entry.lines.len(),
            total = %posted.totals.debit,
            "Journal entry committed"
        );
        self.notifier.publish(LedgerNotification::EntryPosted {
            tenant_id: tenant_id.to_string(),
            entry_id: posted.entry.id.clone(),
            total: posted.totals.debit,
            account_ids: posted.plans.iter().map(|p| p.account_id.clone()).collect(),
            reverses_entry_id: posted.entry.reverses_entry_id.clone(),
        });
        Ok(posted)
    }
}

// =============================================================================
// Staging
// =============================================================================

async fn stage_entry(
    uow: &mut dyn UnitOfWork,
    tenant_id: &str,
    request: &JournalEntryRequest,
    reverses: Option<String>,
) -> EngineResult<PostedEntry> {
    let account_ids = request.lines.iter().map(|l| l.account_id.as_str());
    let held = uow
        .hold(tenant_id, HoldRequest::accounts(account_ids))
        .await?;

    let totals = invariants::check_balanced(&request.lines)?;
    let plans = invariants::plan_account_postings(tenant_id, &held.accounts, &request.lines)?;

    let now = Utc::now();
    let entry_id = Uuid::new_v4().to_string();
    let lines = request
        .lines
        .iter()
        .zip(1..)
        .map(|(line, line_no)| JournalLine {
            id: Uuid::new_v4().to_string(),
            entry_id: entry_id.clone(),
            line_no,
            account_id: line.account_id.clone(),
            debit_amount: line.debit_amount,
            credit_amount: line.credit_amount,
            memo: line.memo.clone(),
        })
        .collect();

    let entry = JournalEntry {
        id: entry_id,
        tenant_id: tenant_id.to_string(),
        description: request.description.clone(),
        reference: request.reference.clone(),
        occurred_at: request.occurred_at.unwrap_or(now),
        recorded_at: now,
        created_by: request.created_by.trim().to_string(),
        reverses_entry_id: reverses,
        lines,
    };

    uow.insert_journal_entry(&entry).await?;
    for plan in &plans {
        let after = uow
            .apply_account_delta(tenant_id, &plan.account_id, plan.delta)
            .await?;
        ensure_applied("account", &plan.account_id, plan.after, after)?;
    }

    Ok(PostedEntry {
        entry,
        totals,
        plans,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
