//! # tally-engine: Transactional Executor for Tally
//!
//! Applies stock movements and journal entries to their aggregates, one
//! atomic scope per event, on top of any [`tally_db::LedgerStore`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tally Request Flow                              │
//! │                                                                         │
//! │  adapter (HTTP, CLI, queue consumer)                                    │
//! │       │  tenant_id + request + RequestContext                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                  tally-engine (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐    │    │
//! │  │   │  stock.rs    │   │  journal.rs  │   │  reversal.rs     │    │    │
//! │  │   │ apply_       │   │ post_journal_│   │ reverse_movement │    │    │
//! │  │   │ movement     │   │ entry        │   │ reverse_entry    │    │    │
//! │  │   └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘    │    │
//! │  │          └──────────────────┼────────────────────┘              │    │
//! │  │                             ▼                                   │    │
//! │  │   engine.rs: open_scope ─► stage ─► close_scope ─► notify.rs    │    │
//! │  │   context.rs: deadline + cancel around every scope              │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-db: LedgerStore / UnitOfWork (SQLite or in-memory)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - [`LedgerEngine`], aggregate lifecycle, reads, scope helpers
//! - [`stock`] - stock movements and transfers
//! - [`journal`] - journal entries
//! - [`reversal`] - compensating events
//! - [`context`] - per-request deadline and cancellation
//! - [`notify`] - post-commit notifications
//! - [`error`] - [`EngineError`] and its wire form
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::{MovementRequest, MovementType};
//! use tally_db::{EngineSettings, InMemoryStore};
//! use tally_engine::{LedgerEngine, RequestContext};
//!
//! let engine = LedgerEngine::new(InMemoryStore::new(), EngineSettings::default());
//! let ctx = RequestContext::new().with_timeout(Duration::from_secs(2));
//!
//! let request = MovementRequest::new(&product_id, MovementType::Out, 3, "cashier-7");
//! match engine.apply_movement(&ctx, "tenant-1", request).await {
//!     Ok(movement) => println!("recorded {}", movement.id),
//!     Err(e) => println!("{}: {}", e.code(), e),
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod context;
pub mod engine;
pub mod error;
pub mod journal;
pub mod notify;
pub mod reversal;
pub mod stock;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use context::{cancel_pair, CancelHandle, CancelSignal, RequestContext};
pub use engine::LedgerEngine;
pub use error::{EngineError, EngineResult, ErrorBody, FieldError, StatusClass};
pub use notify::{LedgerNotification, Notifier};
