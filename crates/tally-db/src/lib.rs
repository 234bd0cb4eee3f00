//! # tally-db: Ledger Store for Tally
//!
//! Durable state for the balance-update engine: aggregates, append-only
//! events, per-aggregate holds and atomic scopes. SQLite (via sqlx) in
//! production, an in-memory store for tests.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  LedgerEngine::apply_movement                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │    store/     │    │  repository/  │    │  Migrations  │   │   │
//! │  │   │               │    │               │    │  (embedded)  │   │   │
//! │  │   │ LedgerStore   │───►│ product       │    │              │   │   │
//! │  │   │ UnitOfWork    │    │ account       │    │ 001_initial_ │   │   │
//! │  │   │ HoldTable     │    │ movement      │    │   schema.sql │   │   │
//! │  │   │ Sqlite/Memory │    │ journal       │    │              │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             SQLite Database (WAL) or process memory             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - `LedgerStore` / `UnitOfWork` traits, holds, both stores
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - SQL per table
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{DbConfig, HoldRequest, LedgerStore, SqliteStore};
//!
//! let store = SqliteStore::connect(DbConfig::new("path/to/tally.db")).await?;
//!
//! let mut uow = store.begin().await?;
//! let held = uow.hold("tenant-1", HoldRequest::products([product_id])).await?;
//! uow.apply_stock_delta("tenant-1", &product_id, -3).await?;
//! uow.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, DatabaseSettings, EngineSettings, LedgerConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::journal::Posting;
pub use store::{
    HeldRows, HoldRequest, InMemoryStore, LedgerStore, SqliteStore, UnitOfWork,
};
