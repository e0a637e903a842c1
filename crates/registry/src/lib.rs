//! npm-style registry client.
//!
//! Three registry surfaces matter to the sync engine:
//! - the **metadata API** (`GET /{package}`): every version with its
//!   keywords, repository field, tarball URL, plus the dist-tags map,
//! - the **change feed** (`GET /_changes`): an ordered, resumable stream of
//!   publish events identified by monotonically increasing sequences,
//! - the **search API** (`GET /-/v1/search`): keyword enumeration for the
//!   first-run backfill.
//!
//! The [`Registry`] trait is the boundary the sync engine consumes;
//! [`RegistryClient`] is the HTTP implementation and [`MockRegistry`]
//! (feature `mock`) the in-memory one for tests.

mod client;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod types;

pub use crate::client::RegistryClient;
#[cfg(feature = "mock")]
pub use crate::mock::MockRegistry;
pub use crate::types::{Change, ChangeBatch, DistInfo, PackageMetadata, RepositoryField, VersionMetadata};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Registry operations the sync engine depends on.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Full metadata for one package: all versions and dist-tags.
    async fn package(&self, name: &str) -> Result<PackageMetadata>;

    /// The registry's current change sequence ("now").
    async fn current_sequence(&self) -> Result<u64>;

    /// A bounded batch of changes strictly after `since`.
    async fn poll_changes(&self, since: u64, limit: u32) -> Result<ChangeBatch>;

    /// Names of packages carrying `keyword`, for the first-run backfill.
    async fn addon_names(&self, keyword: &str) -> Result<Vec<String>>;
}

pub type RegistryHandle = Arc<dyn Registry + Send + Sync>;
