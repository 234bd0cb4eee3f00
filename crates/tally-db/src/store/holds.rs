//! # Aggregate Holds
//!
//! Process-wide exclusive claims on aggregates, one FIFO slot per
//! `(kind, tenant, id)`.
//!
//! ## Deadlock Avoidance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Scope A: TRANSFER p-1 → p-2        Scope B: TRANSFER p-2 → p-1         │
//! │                                                                         │
//! │  Unordered:                         Ordered (what acquire() does):      │
//! │    A holds p-1, waits p-2             A: p-1, then p-2                  │
//! │    B holds p-2, waits p-1             B: p-1 (waits), then p-2          │
//! │    ──► deadlock                       ──► B runs after A                │
//! │                                                                         │
//! │  Keys are sorted by (kind, tenant, id) and deduplicated, and each       │
//! │  scope acquires all of its keys in one call.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Slots are `tokio::sync::Mutex`, which queues waiters in FIFO order.
//! Waiting is cancel-safe: dropping the future leaves the queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::AggregateKind;

/// Identity of a holdable aggregate. The derived order is the global
/// acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HoldKey {
    pub kind: AggregateKind,
    pub tenant_id: String,
    pub id: String,
}

impl HoldKey {
    pub fn product(tenant_id: &str, id: &str) -> Self {
        HoldKey {
            kind: AggregateKind::Product,
            tenant_id: tenant_id.to_string(),
            id: id.to_string(),
        }
    }

    pub fn account(tenant_id: &str, id: &str) -> Self {
        HoldKey {
            kind: AggregateKind::Account,
            tenant_id: tenant_id.to_string(),
            id: id.to_string(),
        }
    }
}

type Slot = Arc<AsyncMutex<()>>;

/// Table of hold slots, created on demand and pruned when unused.
#[derive(Debug, Default)]
pub struct HoldTable {
    slots: Mutex<HashMap<HoldKey, Slot>>,
}

impl HoldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every key, in global order, and returns a guard that
    /// releases them all on drop.
    pub async fn acquire(self: &Arc<Self>, mut keys: Vec<HoldKey>) -> DbResult<HoldGuard> {
        keys.sort();
        keys.dedup();

        let mut guard = HoldGuard {
            table: Arc::clone(self),
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
        };

        for key in keys {
            let slot = self.slot(&key)?;
            debug!(kind = %key.kind, tenant_id = %key.tenant_id, id = %key.id, "Waiting for hold");
            // Register the key before awaiting so a cancelled wait still
            // prunes the slot on drop.
            guard.keys.push(key);
            guard.guards.push(slot.lock_owned().await);
        }

        Ok(guard)
    }

    /// Number of live slots. Used by tests to check pruning.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &HoldKey) -> DbResult<Slot> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| DbError::Internal("hold table lock poisoned".to_string()))?;
        Ok(Arc::clone(slots.entry(key.clone()).or_default()))
    }

    fn prune(&self, keys: &[HoldKey]) {
        if let Ok(mut slots) = self.slots.lock() {
            for key in keys {
                // Clones are only handed out under this lock, so a count of
                // one means nobody holds or waits on the slot.
                if slots.get(key).is_some_and(|s| Arc::strong_count(s) == 1) {
                    slots.remove(key);
                }
            }
        }
    }
}

/// Releases its holds when dropped.
#[derive(Debug)]
pub struct HoldGuard {
    table: Arc<HoldTable>,
    keys: Vec<HoldKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl HoldGuard {
    pub fn keys(&self) -> &[HoldKey] {
        &self.keys
    }
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        self.guards.clear();
        self.table.prune(&self.keys);
    }
}
