//! # Reversals
//!
//! Committed events are never edited. `reverse_movement` and `reverse_entry`
//! write a compensating event through the normal path, linked back to the
//! original, so the same invariants apply.
//!
//! ## Transfer Links
//! ```text
//!   original  T1: A ──10──► B          reversal  T2: B ──10──► A
//!   ───────────────────────────        ──────────────────────────────────
//!   leg S1  product A  (source)   ◄─── leg D2  product A  (destination)
//!   leg D1  product B  (dest)     ◄─── leg S2  product B  (source)
//! ```
//!
//! Each event can be reversed once; storage enforces it, and a second
//! attempt fails with `DuplicateKey`.

use tracing::info;

use tally_core::reversal::{entry_reversal, movement_reversal};
use tally_core::validation::{validate_journal_entry, validate_movement, validate_reason};
use tally_core::{JournalEntry, StockMovement, TransferLeg};
use tally_db::LedgerStore;

use crate::context::RequestContext;
use crate::engine::{check_tenant, LedgerEngine};
use crate::error::{EngineError, EngineResult};
use crate::stock::{first_leg, ReversalLinks};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Reverses a committed movement with one of the opposite direction.
    ///
    /// Either leg of a transfer may be given; the whole transfer is
    /// reversed and the source leg of the compensating transfer returned.
    ///
    /// ## Returns
    /// * `Err(EngineError::NotFound)` - no such movement for the tenant
    /// * `Err(EngineError::DuplicateKey)` - already reversed
    /// * `Err(EngineError::InsufficientStock)` - the stock it added is gone
    pub async fn reverse_movement(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        movement_id: &str,
        reason: &str,
        actor: &str,
    ) -> EngineResult<StockMovement> {
        check_tenant(tenant_id)?;
        validate_reason(reason)?;

        let original = self.movement(tenant_id, movement_id).await?;
        let request = movement_reversal(&original, reason.trim(), actor)?;
        validate_movement(&request)?;

        let links = if original.is_transfer() {
            self.transfer_reversal_links(tenant_id, &original).await?
        } else {
            ReversalLinks {
                primary: Some(original.id.clone()),
                destination: None,
            }
        };

        let legs = self.run_movement(ctx, tenant_id, &request, links).await?;
        let reversal = first_leg(legs)?;
        info!(
            tenant_id = %tenant_id,
            original_id = %original.id,
            reversal_id = %reversal.id,
            "Movement reversed"
        );
        Ok(reversal)
    }

    /// Reverses a committed journal entry with debits and credits swapped.
    ///
    /// ## Returns
    /// * `Err(EngineError::NotFound)` - no such entry for the tenant
    /// * `Err(EngineError::DuplicateKey)` - already reversed
    /// * `Err(EngineError::InvalidAccount)` - an account has since been
    ///   deactivated
    pub async fn reverse_entry(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        entry_id: &str,
        reason: &str,
        actor: &str,
    ) -> EngineResult<JournalEntry> {
        check_tenant(tenant_id)?;
        validate_reason(reason)?;

        let original = self.journal_entry(tenant_id, entry_id).await?;
        let request = entry_reversal(&original, reason.trim(), actor);
        validate_journal_entry(&request)?;

        let posted = self
            .run_entry(ctx, tenant_id, &request, Some(original.id.clone()))
            .await?;
        info!(
            tenant_id = %tenant_id,
            original_id = %original.id,
            reversal_id = %posted.entry.id,
            "Journal entry reversed"
        );
        Ok(posted.entry)
    }

    /// The compensating transfer runs the other way, so its source leg
    /// undoes the original destination leg and vice versa.
    async fn transfer_reversal_links(
        &self,
        tenant_id: &str,
        leg: &StockMovement,
    ) -> EngineResult<ReversalLinks> {
        let transfer_id = leg
            .transfer_id
            .as_deref()
            .ok_or_else(|| EngineError::required("transfer_id"))?;
        let legs = self.store.transfer_legs(tenant_id, transfer_id).await?;

        let find = |wanted: TransferLeg| {
            legs.iter()
                .find(|m| m.transfer_leg == Some(wanted))
                .map(|m| m.id.clone())
                .ok_or_else(|| EngineError::not_found("StockMovement", transfer_id))
        };

        Ok(ReversalLinks {
            primary: Some(find(TransferLeg::Destination)?),
            destination: Some(find(TransferLeg::Source)?),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
