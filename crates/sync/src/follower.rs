//! The registry change-feed follower.

use crate::alias::AliasResolver;
use crate::error::{ErrorKind, Result};
use drydock_docs::{BuilderHandle, SourceRef};
use drydock_registry::{Change, PackageMetadata, RegistryHandle};
use drydock_store::{NewAddon, Repository};
use exn::ResultExt;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables for the change follower.
#[derive(Debug, Clone)]
pub struct FollowerSettings {
    /// The keyword marking a package as an addon.
    pub keyword: String,
    /// How long to idle when the feed has nothing new.
    pub poll_interval: Duration,
    /// Maximum changes fetched per poll.
    pub batch_limit: u32,
}

/// Consumes the registry's ordered change stream, one change at a time.
///
/// On a fresh install (no persisted cursor) it backfills every package
/// currently carrying the addon keyword and then streams from "now"; with a
/// cursor it resumes exactly where the previous run stopped. The cursor only
/// ever moves forward, so duplicate or out-of-order deliveries are absorbed
/// by the store.
pub struct ChangeFollower {
    repo: Repository,
    registry: RegistryHandle,
    builder: BuilderHandle,
    resolver: AliasResolver,
    settings: FollowerSettings,
    shutdown: CancellationToken,
}

impl ChangeFollower {
    pub fn new(
        repo: Repository,
        registry: RegistryHandle,
        builder: BuilderHandle,
        settings: FollowerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let resolver = AliasResolver::new(repo.clone());
        Self {
            repo,
            registry,
            builder,
            resolver,
            settings,
            shutdown,
        }
    }

    /// Run until shutdown. Returns `Err` only for failures that must stop
    /// the loop: the store, or a first-run backfill that couldn't even
    /// enumerate addons (no cursor is written until backfill completes, so a
    /// restart retries it).
    pub async fn run(self) -> Result<()> {
        tracing::info!("starting change follower");
        let mut since = match self.repo.last_sequence().await.or_raise(|| ErrorKind::Store)? {
            Some(sequence) => {
                tracing::info!(sequence, "resuming change feed from persisted cursor");
                sequence
            },
            None => {
                self.backfill().await?;
                // Backfill covered the backlog, so live streaming starts at
                // the registry's current sequence rather than zero.
                let sequence = self.registry.current_sequence().await.or_raise(|| ErrorKind::Registry)?;
                tracing::info!(sequence, "backfill complete, streaming from now");
                sequence
            },
        };
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let batch = match self.registry.poll_changes(since, self.settings.batch_limit).await {
                Ok(batch) => batch,
                Err(error) => {
                    tracing::warn!(%error, "change feed poll failed");
                    if self.idle().await {
                        break;
                    }
                    continue;
                },
            };
            if batch.results.is_empty() {
                if self.idle().await {
                    break;
                }
                continue;
            }
            for change in &batch.results {
                if self.shutdown.is_cancelled() {
                    break;
                }
                self.handle_change(change).await?;
            }
            since = since.max(batch.last_seq);
        }
        tracing::info!("change follower stopped");
        Ok(())
    }

    /// Sleep one poll interval. Returns `true` when shutdown was requested.
    async fn idle(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = tokio::time::sleep(self.settings.poll_interval) => false,
        }
    }

    /// First run: every package currently carrying the addon keyword gets
    /// processed as a synthetic full update.
    async fn backfill(&self) -> Result<()> {
        tracing::info!("first run, catching up on already-published addons");
        let names = self
            .registry
            .addon_names(&self.settings.keyword)
            .await
            .or_raise(|| ErrorKind::Registry)?;
        tracing::info!(count = names.len(), "packages to backfill");
        for name in names {
            match self.registry.package(&name).await {
                Ok(package) if package.is_addon(&self.settings.keyword) => self.process_package(&package).await?,
                Ok(_) => tracing::debug!(package = %name, "keyword search hit is not an addon, skipping"),
                Err(error) => tracing::warn!(package = %name, %error, "metadata fetch failed during backfill, skipping"),
            }
        }
        Ok(())
    }

    /// Process one change-feed entry, then advance the cursor past it.
    async fn handle_change(&self, change: &Change) -> Result<()> {
        tracing::debug!(sequence = change.seq, package = %change.id, "change reported by registry");
        match self.registry.package(&change.id).await {
            Ok(package) => {
                if package.is_addon(&self.settings.keyword) {
                    self.process_package(&package).await?;
                } else {
                    tracing::debug!(package = %change.id, "not an addon, skipping");
                }
            },
            // Deliberate at-most-once tradeoff: a transient metadata failure
            // skips this change instead of blocking the whole stream. The
            // next publish of the same package catches it up.
            Err(error) => {
                tracing::warn!(package = %change.id, %error, "metadata fetch failed, skipping change")
            },
        }
        self.repo.advance_sequence(change.seq).await.or_raise(|| ErrorKind::Store)?;
        Ok(())
    }

    /// Register the addon, create and build any newly published versions,
    /// then re-resolve dist-tag aliases and `latest`.
    async fn process_package(&self, package: &PackageMetadata) -> Result<()> {
        tracing::info!(addon = %package.name, "updating addon versions");
        let addon = self
            .repo
            .find_or_create_addon(&NewAddon {
                name: package.name.clone(),
                description: package.description.clone(),
                repo_slug: package.repo_slug(),
            })
            .await
            .or_raise(|| ErrorKind::Store)?;
        let known: HashSet<String> = self
            .repo
            .published_version_names(&addon.name)
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .collect();
        for (name, metadata) in &package.versions {
            if known.contains(name) {
                continue;
            }
            tracing::info!(addon = %addon.name, version = %name, "building newly published version");
            let version = self
                .repo
                .create_published_version(&addon.name, name, &metadata.dist.tarball)
                .await
                .or_raise(|| ErrorKind::Store)?;
            let source = SourceRef::release(name.clone());
            match self.builder.build(&addon.name, &source, &metadata.dist.tarball, &addon.docs).await {
                Ok(Some(built)) => self
                    .repo
                    .record_build(version.id, &built.docs_url, built.built_at)
                    .await
                    .or_raise(|| ErrorKind::Store)?,
                Ok(None) => tracing::debug!(addon = %addon.name, version = %name, "version ships no documentation"),
                // One version failing to build never blocks the others or
                // the cursor.
                Err(error) => {
                    tracing::warn!(addon = %addon.name, version = %name, %error, "docs build failed, skipping version")
                },
            }
        }
        for (tag, target) in &package.dist_tags {
            self.resolver.create_or_update(&addon.name, tag, target).await?;
        }
        self.resolver.resolve_latest(&addon, &addon.docs, package.dist_latest()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_docs::MockBuilder;
    use drydock_registry::{DistInfo, MockRegistry, RepositoryField, VersionMetadata};
    use drydock_store::Database;
    use std::sync::Arc;

    fn settings() -> FollowerSettings {
        FollowerSettings {
            keyword: "framework-addon".to_string(),
            poll_interval: Duration::from_millis(5),
            batch_limit: 100,
        }
    }

    fn version(ver: &str, keywords: &[&str]) -> VersionMetadata {
        VersionMetadata {
            version: ver.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            dist: DistInfo {
                tarball: format!("mock://tarballs/{ver}.tgz"),
            },
            repository: Some(RepositoryField::Shorthand("owner/my-addon".to_string())),
        }
    }

    fn package(name: &str, versions: &[(&str, &[&str])], latest: Option<&str>) -> PackageMetadata {
        let mut dist_tags = std::collections::HashMap::new();
        if let Some(latest) = latest {
            dist_tags.insert("latest".to_string(), latest.to_string());
        }
        PackageMetadata {
            name: name.to_string(),
            description: Some("an addon".to_string()),
            dist_tags,
            versions: versions
                .iter()
                .map(|(ver, keywords)| ((*ver).to_string(), version(ver, keywords)))
                .collect(),
        }
    }

    struct Fixture {
        repo: Repository,
        registry: Arc<MockRegistry>,
        builder: Arc<MockBuilder>,
        follower: ChangeFollower,
        shutdown: CancellationToken,
    }

    async fn fixture() -> Fixture {
        fixture_with_builder(MockBuilder::new()).await
    }

    async fn fixture_with_builder(builder: MockBuilder) -> Fixture {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let registry = Arc::new(MockRegistry::new());
        let builder = Arc::new(builder);
        let shutdown = CancellationToken::new();
        let follower = ChangeFollower::new(
            repo.clone(),
            registry.clone(),
            builder.clone(),
            settings(),
            shutdown.clone(),
        );
        Fixture {
            repo,
            registry,
            builder,
            follower,
            shutdown,
        }
    }

    #[tokio::test]
    async fn test_change_creates_addon_and_versions() {
        let f = fixture().await;
        f.registry
            .publish(package("my-addon", &[("1.0.0", &["framework-addon"])], Some("1.0.0")))
            .await;
        f.follower.handle_change(&Change { seq: 7, id: "my-addon".to_string() }).await.unwrap();
        let addon = f.repo.find_addon("my-addon").await.unwrap().unwrap();
        assert_eq!(addon.repo_slug.as_deref(), Some("owner/my-addon"));
        assert_eq!(f.repo.published_version_names("my-addon").await.unwrap(), vec!["1.0.0"]);
        assert_eq!(f.repo.last_sequence().await.unwrap(), Some(7));
        // The tarball was built and recorded.
        let version = f.repo.find_version_by_name("my-addon", "1.0.0").await.unwrap().unwrap();
        assert!(version.docs_url.is_some());
        assert_eq!(f.builder.calls().len(), 1);
        assert_eq!(f.builder.calls()[0].archive_url, "mock://tarballs/1.0.0.tgz");
    }

    #[tokio::test]
    async fn test_non_addons_are_ignored_but_cursor_advances() {
        let f = fixture().await;
        f.registry.publish(package("plain-lib", &[("1.0.0", &[])], Some("1.0.0"))).await;
        f.follower.handle_change(&Change { seq: 3, id: "plain-lib".to_string() }).await.unwrap();
        assert!(f.repo.find_addon("plain-lib").await.unwrap().is_none());
        assert_eq!(f.repo.last_sequence().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_metadata_failure_skips_but_cursor_advances() {
        let f = fixture().await;
        f.registry.publish(package("flaky", &[("1.0.0", &["framework-addon"])], None)).await;
        f.registry.break_package("flaky").await;
        f.follower.handle_change(&Change { seq: 5, id: "flaky".to_string() }).await.unwrap();
        assert!(f.repo.find_addon("flaky").await.unwrap().is_none());
        assert_eq!(f.repo.last_sequence().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let f = fixture().await;
        let pkg = package("my-addon", &[("1.0.0", &["framework-addon"])], Some("1.0.0"));
        f.registry.publish(pkg.clone()).await;
        f.follower.process_package(&pkg).await.unwrap();
        f.follower.process_package(&pkg).await.unwrap();
        assert_eq!(f.repo.published_version_names("my-addon").await.unwrap(), vec!["1.0.0"]);
        // Only the first pass saw a new version; the second built nothing.
        assert_eq!(f.builder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_only_new_versions_are_built() {
        let f = fixture().await;
        let first = package("my-addon", &[("1.0.0", &["framework-addon"])], Some("1.0.0"));
        f.follower.process_package(&first).await.unwrap();
        let second = package(
            "my-addon",
            &[("1.0.0", &["framework-addon"]), ("1.1.0", &["framework-addon"])],
            Some("1.1.0"),
        );
        f.follower.process_package(&second).await.unwrap();
        let names = f.repo.published_version_names("my-addon").await.unwrap();
        assert_eq!(names, vec!["1.0.0", "1.1.0"]);
        let built: Vec<String> = f.builder.calls().into_iter().map(|call| call.archive_url).collect();
        assert_eq!(built, vec!["mock://tarballs/1.0.0.tgz", "mock://tarballs/1.1.0.tgz"]);
    }

    #[tokio::test]
    async fn test_build_failure_does_not_block_other_versions() {
        let f = fixture_with_builder(MockBuilder::failing()).await;
        let pkg = package(
            "my-addon",
            &[("1.0.0", &["framework-addon"]), ("1.1.0", &["framework-addon"])],
            Some("1.1.0"),
        );
        f.follower.process_package(&pkg).await.unwrap();
        // Both version rows exist even though every build failed.
        assert_eq!(f.repo.published_version_names("my-addon").await.unwrap().len(), 2);
        let version = f.repo.find_version_by_name("my-addon", "1.1.0").await.unwrap().unwrap();
        assert!(version.docs_url.is_none());
        assert!(version.built_at.is_none());
    }

    #[tokio::test]
    async fn test_dist_tags_become_aliases() {
        let f = fixture().await;
        let mut pkg = package(
            "my-addon",
            &[("1.0.0", &["framework-addon"]), ("2.0.0-beta.1", &["framework-addon"])],
            Some("1.0.0"),
        );
        pkg.dist_tags.insert("beta".to_string(), "2.0.0-beta.1".to_string());
        f.follower.process_package(&pkg).await.unwrap();
        let beta = f.repo.find_alias("my-addon", "beta").await.unwrap().unwrap();
        let target = f.repo.find_version_by_name("my-addon", "2.0.0-beta.1").await.unwrap().unwrap();
        assert_eq!(beta.version_id, target.id);
        // `latest` resolved too (master fallback: repo + branches-over-tags,
        // no master branch version yet, so the alias stayed unset).
        assert!(f.repo.find_alias("my-addon", "latest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_alias_for_repoless_addon_uses_tag() {
        let f = fixture().await;
        let mut pkg = package("no-repo", &[("1.0.0", &["framework-addon"])], Some("1.0.0"));
        for version in pkg.versions.values_mut() {
            version.repository = None;
        }
        f.follower.process_package(&pkg).await.unwrap();
        let latest = f.repo.find_alias("no-repo", "latest").await.unwrap().unwrap();
        let target = f.repo.find_version_by_name("no-repo", "1.0.0").await.unwrap().unwrap();
        assert_eq!(latest.version_id, target.id);
    }

    #[tokio::test]
    async fn test_backfill_processes_keyword_matches() {
        let f = fixture().await;
        f.registry
            .publish(package("addon-one", &[("1.0.0", &["framework-addon"])], Some("1.0.0")))
            .await;
        f.registry
            .publish(package("addon-two", &[("0.1.0", &["framework-addon"])], Some("0.1.0")))
            .await;
        f.registry.publish(package("plain-lib", &[("1.0.0", &[])], Some("1.0.0"))).await;
        f.follower.backfill().await.unwrap();
        assert!(f.repo.find_addon("addon-one").await.unwrap().is_some());
        assert!(f.repo.find_addon("addon-two").await.unwrap().is_some());
        assert!(f.repo.find_addon("plain-lib").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_streams_batches_and_persists_cursor() {
        let f = fixture().await;
        // A cursor exists, so run() resumes instead of backfilling.
        f.repo.advance_sequence(10).await.unwrap();
        f.registry
            .publish(package("my-addon", &[("1.0.0", &["framework-addon"])], Some("1.0.0")))
            .await;
        f.registry.push_change(11, "my-addon").await;
        let handle = tokio::spawn(f.follower.run());
        // Give the loop a few polls, then stop it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(f.repo.last_sequence().await.unwrap(), Some(11));
        assert!(f.repo.find_addon("my-addon").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_promptly_on_shutdown() {
        let f = fixture().await;
        f.repo.advance_sequence(1).await.unwrap();
        f.shutdown.cancel();
        f.follower.run().await.unwrap();
    }
}
