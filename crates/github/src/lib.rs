//! Code-host client.
//!
//! The branch poller needs four things from the code host: the live branch
//! list with head commits, the remaining rate-limit budget, the raw docs
//! config file from an addon's default branch, and a tarball URL for any
//! branch. The [`RepoHost`] trait is that boundary; [`GithubClient`] is the
//! HTTP implementation and [`MockHost`] (feature `mock`) the in-memory one.

mod client;
pub mod error;
#[cfg(feature = "mock")]
mod mock;

pub use crate::client::GithubClient;
#[cfg(feature = "mock")]
pub use crate::mock::MockHost;
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// A live branch and its head commit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitRef,
}

impl Branch {
    pub fn new(name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit: CommitRef { sha: sha.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Snapshot of the current rate-limit window. Ephemeral by design —
/// re-fetched before every scheduling decision, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp at which the window resets.
    pub resets_at: u64,
}

/// Code-host operations the branch poller depends on.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// All branches of `owner/repo` with their head commits.
    async fn branches(&self, slug: &str) -> Result<Vec<Branch>>;

    /// The current rate-limit window.
    async fn rate_limit(&self) -> Result<RateLimit>;

    /// The raw docs config file from the repository's default branch, or
    /// `None` if the repository doesn't carry one.
    async fn docs_config(&self, slug: &str) -> Result<Option<Vec<u8>>>;

    /// Tarball URL for a branch snapshot.
    fn archive_url(&self, slug: &str, branch: &str) -> String;
}

pub type HostHandle = Arc<dyn RepoHost + Send + Sync>;
