//! In-memory registry for testing.

use crate::error::{ErrorKind, Result};
use crate::types::{Change, ChangeBatch, PackageMetadata};
use crate::Registry;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// In-memory registry for testing.
///
/// Holds packages and a change log behind [`RwLock`]s so the trait methods
/// operate on `&self`, matching how the real client is shared.
#[derive(Default)]
pub struct MockRegistry {
    packages: RwLock<HashMap<String, PackageMetadata>>,
    changes: RwLock<Vec<Change>>,
    sequence: RwLock<u64>,
    unreachable: RwLock<HashSet<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a package's metadata.
    pub async fn publish(&self, package: PackageMetadata) {
        self.packages.write().await.insert(package.name.clone(), package);
    }

    /// Append a change-feed entry and advance the current sequence to it.
    pub async fn push_change(&self, seq: u64, id: impl Into<String>) {
        self.changes.write().await.push(Change { seq, id: id.into() });
        let mut current = self.sequence.write().await;
        *current = (*current).max(seq);
    }

    pub async fn set_sequence(&self, seq: u64) {
        *self.sequence.write().await = seq;
    }

    /// Make metadata fetches for `name` fail, simulating a transient outage.
    pub async fn break_package(&self, name: impl Into<String>) {
        self.unreachable.write().await.insert(name.into());
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn package(&self, name: &str) -> Result<PackageMetadata> {
        if self.unreachable.read().await.contains(name) {
            exn::bail!(ErrorKind::Http(format!("mock://{name}")));
        }
        self.packages
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::Http(format!("mock://{name}"))))
    }

    async fn current_sequence(&self) -> Result<u64> {
        Ok(*self.sequence.read().await)
    }

    async fn poll_changes(&self, since: u64, limit: u32) -> Result<ChangeBatch> {
        let results: Vec<Change> = self
            .changes
            .read()
            .await
            .iter()
            .filter(|change| change.seq > since)
            .take(limit as usize)
            .cloned()
            .collect();
        let last_seq = results.last().map(|change| change.seq).unwrap_or(since);
        Ok(ChangeBatch { results, last_seq })
    }

    async fn addon_names(&self, keyword: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .packages
            .read()
            .await
            .values()
            .filter(|package| package.is_addon(keyword))
            .map(|package| package.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
