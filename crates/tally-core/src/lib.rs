//! # tally-core: Pure Business Rules for Tally
//!
//! The validator, the invariant checker and reversal planning, together with
//! the domain types they operate on. Nothing in this crate performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Adapter (HTTP, CLI, jobs)                       │   │
//! │  │        tenant + parsed payload in, result / error code out      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tally-engine (executor)                         │   │
//! │  │   apply_movement, post_journal_entry, reverse_*, get_balance    │   │
//! │  └─────────────┬───────────────────────────────┬───────────────────┘   │
//! │                │ calls                         │ holds, reads, writes   │
//! │  ┌─────────────▼─────────────────────┐ ┌───────▼───────────────────┐   │
//! │  │    ★ tally-core (THIS CRATE) ★    │ │        tally-db           │   │
//! │  │                                   │ │  LedgerStore / UnitOfWork │   │
//! │  │  types  money  validation         │ │  SQLite, in-memory        │   │
//! │  │  invariants  reversal             │ │                           │   │
//! │  │                                   │ └───────────────────────────┘   │
//! │  │  NO I/O • NO LOCKS • PURE         │                                 │
//! │  └───────────────────────────────────┘                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Aggregates, events and request payloads
//! - [`money`] - Integer minor-unit money with checked arithmetic
//! - [`error`] - Validation and business-rule errors
//! - [`validation`] - Static request checks (no state)
//! - [`invariants`] - Checks against freshly-read aggregate state
//! - [`reversal`] - Compensating-event planning
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output
//! 2. **No I/O**: storage, clocks and locks belong to the other crates
//! 3. **Integer Money**: every amount is an i64 in minor units
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::invariants::check_balanced;
//! use tally_core::validation::validate_journal_entry;
//! use tally_core::JournalEntryRequest;
//!
//! let entry = JournalEntryRequest::new("clerk")
//!     .debit("cash", 5000)
//!     .credit("sales", 3000);
//!
//! // Statically fine...
//! assert!(validate_journal_entry(&entry).is_ok());
//! // ...but it does not balance.
//! assert!(check_balanced(&entry.lines).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod invariants;
pub mod money;
pub mod reversal;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError, ValidationErrors};
pub use invariants::{AccountPlan, ConservationReport, EntryTotals, StockPlan};
pub use money::Money;
pub use types::*;
