//! In-memory code host for testing.

use crate::error::{ErrorKind, Result};
use crate::{Branch, RateLimit, RepoHost};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory code host for testing.
///
/// Repositories, docs configs and the rate-limit window are all settable;
/// unknown repositories answer with an empty branch list, which is also what
/// GitHub reports for an empty repository.
pub struct MockHost {
    branches: RwLock<HashMap<String, Vec<Branch>>>,
    docs_configs: RwLock<HashMap<String, Vec<u8>>>,
    rate_limit: RwLock<RateLimit>,
    unreachable: RwLock<HashSet<String>>,
}

impl MockHost {
    pub fn new() -> Self {
        let now = UtcDateTime::now().unix_timestamp() as u64;
        Self {
            branches: RwLock::new(HashMap::new()),
            docs_configs: RwLock::new(HashMap::new()),
            rate_limit: RwLock::new(RateLimit {
                limit: 5000,
                remaining: 5000,
                resets_at: now + 3600,
            }),
            unreachable: RwLock::new(HashSet::new()),
        }
    }

    pub async fn set_branches(&self, slug: impl Into<String>, branches: Vec<Branch>) {
        self.branches.write().await.insert(slug.into(), branches);
    }

    pub async fn set_docs_config(&self, slug: impl Into<String>, raw: impl Into<Vec<u8>>) {
        self.docs_configs.write().await.insert(slug.into(), raw.into());
    }

    pub async fn set_rate_limit(&self, rate_limit: RateLimit) {
        *self.rate_limit.write().await = rate_limit;
    }

    /// Make all requests touching `slug` fail, simulating an outage.
    pub async fn break_repo(&self, slug: impl Into<String>) {
        self.unreachable.write().await.insert(slug.into());
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoHost for MockHost {
    async fn branches(&self, slug: &str) -> Result<Vec<Branch>> {
        if self.unreachable.read().await.contains(slug) {
            exn::bail!(ErrorKind::Http(format!("mock://{slug}")));
        }
        Ok(self.branches.read().await.get(slug).cloned().unwrap_or_default())
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        Ok(*self.rate_limit.read().await)
    }

    async fn docs_config(&self, slug: &str) -> Result<Option<Vec<u8>>> {
        if self.unreachable.read().await.contains(slug) {
            exn::bail!(ErrorKind::Http(format!("mock://{slug}")));
        }
        Ok(self.docs_configs.read().await.get(slug).cloned())
    }

    fn archive_url(&self, slug: &str, branch: &str) -> String {
        format!("mock://archive/{}/{}.tar.gz", slug, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_repo_has_no_branches() {
        let host = MockHost::new();
        assert!(host.branches("owner/unknown").await.unwrap().is_empty());
        assert!(host.docs_config("owner/unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_break_repo() {
        let host = MockHost::new();
        host.set_branches("owner/repo", vec![Branch::new("master", "aaa")]).await;
        host.break_repo("owner/repo").await;
        assert!(host.branches("owner/repo").await.is_err());
    }
}
