//! SQLite persistent store for the addon synchronization engine.
//!
//! This is the one durable surface the two sync pipelines share. It tracks:
//! - **Addons**: packages carrying the addon marker, with their docs
//!   configuration snapshot,
//! - **Versions**: documentation-bearing artifacts, either published
//!   releases or tracked branches,
//! - **VersionAliases**: named pointers (`latest`, dist-tags) to exactly one
//!   version per (addon, alias),
//! - **the change cursor**: the highest fully-processed registry sequence.
//!
//! The uniqueness and monotonicity invariants live in the SQL itself
//! (unique indexes, conditional upserts), so repeated or interleaved
//! processing of the same update converges instead of duplicating rows.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{Addon, NewAddon, Version, VersionAlias, VersionSource};
pub use crate::repo::Repository;
