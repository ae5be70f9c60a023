//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Read path                        Write path                            │
//! │                                                                         │
//! │  db.products().list()             db.engine().apply_exit(..)            │
//! │       │                                │  one transaction               │
//! │       ▼                                ▼                                │
//! │  ProductRepository ──┐      product::fetch_product(&mut tx, ..)        │
//! │  LedgerRepository  ──┤      product::bump_version(&mut tx, ..)         │
//! │  CountRepository   ──┤      ledger::insert_entry(&mut tx, ..)          │
//! │  RegistryRepository ─┘            │                                     │
//! │       │                           │                                     │
//! │       ▼                           ▼                                     │
//! │                      SQLite                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories are read-mostly handles over the pool. The row-level write
//! helpers take a `&mut SqliteConnection` so the engine can run them inside
//! its own transaction; they are crate-private.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products with location quantities
//! - [`LedgerRepository`](ledger::LedgerRepository) - Kardex history
//! - [`CountRepository`](count::CountRepository) - Count sessions
//! - [`RegistryRepository`](registry::RegistryRepository) - Locations, categories, suppliers

pub mod count;
pub mod ledger;
pub mod product;
pub mod registry;
