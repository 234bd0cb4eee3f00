//! # Repository Module
//!
//! SQL for each table, kept in one place.
//!
//! ## Two Kinds of Operation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pool-level (repository structs)        Scope-level (free functions)    │
//! │  ───────────────────────────────        ─────────────────────────────   │
//! │  db.products().get_by_id(t, id)         product::touch(conn, t, id)     │
//! │  db.products().insert(&p)               product::fetch(conn, t, id)     │
//! │  db.movements().for_product(t, id)      product::apply_delta(conn, ..)  │
//! │  db.journal().totals(t)                 movement::insert(conn, &m)      │
//! │                                         journal::insert_entry(conn, &e) │
//! │  any pooled connection,                                                 │
//! │  autocommit                             the connection pinned by an     │
//! │                                         open SqliteUnitOfWork           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All queries are runtime-checked (`query` / `query_as` + `FromRow`) rather
//! than the compile-time `query!` / `query_as!` macros, so the crate builds
//! without a live database or an offline query cache.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository)
//! - [`AccountRepository`](account::AccountRepository)
//! - [`MovementRepository`](movement::MovementRepository)
//! - [`JournalRepository`](journal::JournalRepository)

pub mod account;
pub mod journal;
pub mod movement;
pub mod product;
