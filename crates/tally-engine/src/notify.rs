//! # Post-Commit Notifications
//!
//! Collaborators outside the core (mail, webhooks, read models) learn about
//! committed changes from a broadcast channel. Nothing is published for a
//! scope that did not commit, and publishing never blocks or fails the
//! operation that triggered it.
//!
//! ```text
//! commit ok ──► Notifier::publish ──► broadcast ──► subscriber 1
//!                                              └──► subscriber N
//!           (no subscribers: dropped, logged at debug)
//! ```

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use tally_core::{AggregateRef, LifecycleStatus, Money, MovementType};

/// A committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerNotification {
    /// One movement row was committed. A transfer produces one per leg.
    MovementApplied {
        tenant_id: String,
        movement_id: String,
        product_id: String,
        movement_type: MovementType,
        quantity: i64,
        quantity_on_hand: i64,
        transfer_id: Option<String>,
        reverses_movement_id: Option<String>,
    },

    /// A product crossed below its reorder threshold.
    LowStock {
        tenant_id: String,
        product_id: String,
        quantity_on_hand: i64,
        minimum_stock: i64,
    },

    EntryPosted {
        tenant_id: String,
        entry_id: String,
        total: Money,
        account_ids: Vec<String>,
        reverses_entry_id: Option<String>,
    },

    StatusChanged {
        tenant_id: String,
        aggregate: AggregateRef,
        status: LifecycleStatus,
    },
}

/// Sending half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<LedgerNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Notifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers received the notification.
    pub fn publish(&self, notification: LedgerNotification) -> usize {
        match self.tx.send(notification) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(dropped)) => {
                debug!(notification = ?dropped, "No subscribers for notification");
                0
            }
        }
    }
}
