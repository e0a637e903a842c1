//! The branch sync scheduler.

use crate::alias::AliasResolver;
use crate::diff::{BranchAction, plan};
use crate::error::{ErrorKind, Result};
use crate::pacing::Pacing;
use drydock_docs::{BuilderHandle, DocsConfig, SourceRef};
use drydock_github::{Branch, HostHandle};
use drydock_registry::RegistryHandle;
use drydock_store::{Addon, Repository, Version};
use exn::ResultExt;
use std::time::Duration;
use time::UtcDateTime;
use tokio_util::sync::CancellationToken;

/// Tunables for the branch sync scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Floor for the adaptive interval between cycles.
    pub min_interval: Duration,
    /// Retry delay while no addon is eligible yet (the startup race with
    /// the change follower on a fresh database).
    pub startup_delay: Duration,
}

/// Round-robins over addons with a linked repository, reconciling their
/// live branches against tracked branch versions.
///
/// This is an explicit perpetual loop, not a fixed-interval timer: after
/// each cycle it re-reads the code host's rate-limit window and sleeps just
/// long enough to spread the remaining safe budget across the rest of the
/// window. One addon per cycle, cycles never overlap.
pub struct BranchSyncScheduler {
    repo: Repository,
    host: HostHandle,
    registry: RegistryHandle,
    builder: BuilderHandle,
    resolver: AliasResolver,
    pacing: Pacing,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
}

impl BranchSyncScheduler {
    pub fn new(
        repo: Repository,
        host: HostHandle,
        registry: RegistryHandle,
        builder: BuilderHandle,
        settings: SchedulerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let resolver = AliasResolver::new(repo.clone());
        let pacing = Pacing::new(settings.min_interval);
        Self {
            repo,
            host,
            registry,
            builder,
            resolver,
            pacing,
            settings,
            shutdown,
        }
    }

    /// Run until shutdown. Returns `Err` only on store failures — a single
    /// addon's bad data or a flaky network must never kill the loop.
    pub async fn run(self) -> Result<()> {
        tracing::info!("starting branch sync scheduler");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let Some(addon) = self.repo.stalest_addon_with_repo().await.or_raise(|| ErrorKind::Store)? else {
                if self.wait(self.settings.startup_delay).await {
                    break;
                }
                continue;
            };
            tracing::debug!(addon = %addon.name, "checking most stale addon for branch updates");
            match self.sync_addon(&addon).await {
                Ok(()) => {},
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => tracing::warn!(addon = %addon.name, %error, "branch sync cycle failed"),
            }
            self.repo
                .touch_checked(&addon.name, UtcDateTime::now())
                .await
                .or_raise(|| ErrorKind::Store)?;
            if self.wait(self.next_delay().await).await {
                break;
            }
        }
        tracing::info!("branch sync scheduler stopped");
        Ok(())
    }

    /// Sleep for `delay`. Returns `true` when shutdown was requested.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    /// Re-read the rate-limit window and compute the next cycle's delay.
    async fn next_delay(&self) -> Duration {
        match self.host.rate_limit().await {
            Ok(window) => {
                let now = UtcDateTime::now().unix_timestamp().max(0) as u64;
                let delay = self.pacing.interval(&window, now);
                tracing::debug!(
                    remaining = window.remaining,
                    limit = window.limit,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling next branch check"
                );
                delay
            },
            // The budget check is advisory; the floor is still polite.
            Err(error) => {
                tracing::warn!(%error, "rate limit check failed, using minimum interval");
                self.pacing.min_interval
            },
        }
    }

    /// One full cycle for one addon: refresh config, diff branches, apply.
    async fn sync_addon(&self, addon: &Addon) -> Result<()> {
        let Some(slug) = addon.repo_slug.as_deref() else {
            // The stalest-addon query filters on repo_slug; nothing to do.
            return Ok(());
        };
        let config = self.refresh_docs_config(addon, slug).await?;
        let live = self.host.branches(slug).await.or_raise(|| ErrorKind::Host)?;
        let version_branches: Vec<Branch> =
            live.into_iter().filter(|branch| config.tracks_branch(&branch.name)).collect();
        tracing::debug!(addon = %addon.name, count = version_branches.len(), "live version branches");
        let tracked = self.repo.branch_versions(&addon.name).await.or_raise(|| ErrorKind::Store)?;
        for action in plan(&version_branches, tracked) {
            match action {
                BranchAction::Delete(version) => {
                    tracing::info!(addon = %addon.name, branch = %version.name, "upstream branch deleted, dropping its version");
                    self.repo.delete_version(version.id).await.or_raise(|| ErrorKind::Store)?;
                },
                BranchAction::Create(branch) => {
                    tracing::info!(addon = %addon.name, branch = %branch.name, "new version branch, tracking it");
                    let display_name = config.display_name_for(&branch.name);
                    let version = self
                        .repo
                        .create_branch_version(&addon.name, &branch.name, display_name, &branch.commit.sha)
                        .await
                        .or_raise(|| ErrorKind::Store)?;
                    self.build_branch(addon, slug, &config, &version, &branch.commit.sha).await?;
                },
                BranchAction::Update { version, commit } => {
                    tracing::info!(addon = %addon.name, branch = %version.name, "branch moved, rebuilding docs");
                    self.build_branch(addon, slug, &config, &version, &commit).await?;
                },
            }
        }
        // Aliases converge after any version mutation. Dist-tags are
        // fetched best-effort here; without them rules 3..5 still apply.
        let dist_latest = match self.registry.package(&addon.name).await {
            Ok(package) => package.dist_latest().map(str::to_string),
            Err(error) => {
                tracing::debug!(addon = %addon.name, %error, "registry metadata unavailable during branch sync");
                None
            },
        };
        self.resolver.resolve_latest(addon, &config, dist_latest.as_deref()).await?;
        Ok(())
    }

    /// Build a branch's docs and advance its bookkeeping.
    ///
    /// The commit hash and timestamp advance even when the build fails:
    /// a branch that cannot build is retried when it next moves, not
    /// hammered every cycle. Only `docs_url` is reserved for success.
    async fn build_branch(
        &self,
        addon: &Addon,
        slug: &str,
        config: &DocsConfig,
        version: &Version,
        commit: &str,
    ) -> Result<()> {
        let source = SourceRef::branch(version.name.clone());
        let archive_url = self.host.archive_url(slug, &version.name);
        let built = self.builder.build(&addon.name, &source, &archive_url, config).await;
        self.repo
            .advance_branch(version.id, commit, UtcDateTime::now())
            .await
            .or_raise(|| ErrorKind::Store)?;
        match built {
            Ok(Some(built)) => self
                .repo
                .record_build(version.id, &built.docs_url, built.built_at)
                .await
                .or_raise(|| ErrorKind::Store)?,
            Ok(None) => tracing::debug!(addon = %addon.name, branch = %version.name, "branch ships no documentation"),
            Err(error) => {
                tracing::warn!(addon = %addon.name, branch = %version.name, %error, "docs build failed, bookkeeping still advanced")
            },
        }
        Ok(())
    }

    /// Refresh the addon's docs configuration from its default branch.
    ///
    /// A fetched file is merged over the built-in defaults and persisted; a
    /// missing file, fetch failure or malformed file falls back to the
    /// addon's previously stored configuration.
    async fn refresh_docs_config(&self, addon: &Addon, slug: &str) -> Result<DocsConfig> {
        match self.host.docs_config(slug).await {
            Ok(Some(raw)) => match DocsConfig::merged(&raw, &DocsConfig::default()) {
                Ok(config) => {
                    self.repo
                        .update_docs_config(&addon.name, &config)
                        .await
                        .or_raise(|| ErrorKind::Store)?;
                    Ok(config)
                },
                Err(_) => {
                    tracing::debug!(addon = %addon.name, "malformed docs config, keeping stored configuration");
                    Ok(addon.docs.clone())
                },
            },
            Ok(None) => Ok(addon.docs.clone()),
            Err(error) => {
                tracing::warn!(addon = %addon.name, %error, "docs config fetch failed, keeping stored configuration");
                Ok(addon.docs.clone())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_docs::MockBuilder;
    use drydock_github::MockHost;
    use drydock_registry::MockRegistry;
    use drydock_store::{Database, NewAddon};
    use std::sync::Arc;

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            min_interval: Duration::from_millis(1),
            startup_delay: Duration::from_millis(1),
        }
    }

    struct Fixture {
        repo: Repository,
        host: Arc<MockHost>,
        builder: Arc<MockBuilder>,
        scheduler: BranchSyncScheduler,
        shutdown: CancellationToken,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let host = Arc::new(MockHost::new());
        let builder = Arc::new(MockBuilder::new());
        let registry = Arc::new(MockRegistry::new());
        let shutdown = CancellationToken::new();
        let scheduler = BranchSyncScheduler::new(
            repo.clone(),
            host.clone(),
            registry.clone(),
            builder.clone(),
            settings(),
            shutdown.clone(),
        );
        Fixture {
            repo,
            host,
            builder,
            scheduler,
            shutdown,
        }
    }

    async fn addon(repo: &Repository, name: &str) -> Addon {
        repo.find_or_create_addon(&NewAddon {
            name: name.to_string(),
            description: None,
            repo_slug: Some(format!("owner/{name}")),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_cycle_tracks_version_branches() {
        let f = fixture().await;
        let addon = addon(&f.repo, "my-addon").await;
        f.host
            .set_branches(
                "owner/my-addon",
                vec![
                    Branch::new("master", "m-sha"),
                    Branch::new("1.2.3", "v-sha"),
                    Branch::new("feature/shiny", "f-sha"),
                ],
            )
            .await;
        f.scheduler.sync_addon(&addon).await.unwrap();
        let tracked = f.repo.branch_versions("my-addon").await.unwrap();
        let names: Vec<&str> = tracked.iter().map(|version| version.name.as_str()).collect();
        // The feature branch is neither semver nor configured.
        assert_eq!(names, vec!["master", "1.2.3"]);
        // Both tracked branches got builds from their archive URLs.
        let built: Vec<String> = f.builder.calls().into_iter().map(|call| call.archive_url).collect();
        assert_eq!(
            built,
            vec![
                "mock://archive/owner/my-addon/master.tar.gz",
                "mock://archive/owner/my-addon/1.2.3.tar.gz",
            ]
        );
        let master = f.repo.find_version_by_name("my-addon", "master").await.unwrap().unwrap();
        assert_eq!(master.last_seen_commit(), Some("m-sha"));
        assert!(master.docs_url.is_some());
    }

    #[tokio::test]
    async fn test_three_way_diff_applied() {
        let f = fixture().await;
        let addon = addon(&f.repo, "my-addon").await;
        f.repo.create_branch_version("my-addon", "1.0.0", None, "a-sha").await.unwrap();
        f.repo.create_branch_version("my-addon", "master", None, "b-sha").await.unwrap();
        // Upstream: 1.0.0 is gone, master unchanged, 2.0.0 is new.
        f.host
            .set_branches(
                "owner/my-addon",
                vec![Branch::new("master", "b-sha"), Branch::new("2.0.0", "c-sha")],
            )
            .await;
        f.scheduler.sync_addon(&addon).await.unwrap();
        let names: Vec<String> = f
            .repo
            .branch_versions("my-addon")
            .await
            .unwrap()
            .into_iter()
            .map(|version| version.name)
            .collect();
        assert_eq!(names, vec!["master", "2.0.0"]);
        // Only the new branch was built; the unchanged one wasn't touched.
        let built: Vec<String> = f.builder.calls().into_iter().map(|call| call.archive_url).collect();
        assert_eq!(built, vec!["mock://archive/owner/my-addon/2.0.0.tar.gz"]);
    }

    #[tokio::test]
    async fn test_moved_branch_is_rebuilt_and_bookkeeping_advances() {
        let f = fixture().await;
        let addon = addon(&f.repo, "my-addon").await;
        let version = f.repo.create_branch_version("my-addon", "master", None, "old-sha").await.unwrap();
        f.host.set_branches("owner/my-addon", vec![Branch::new("master", "new-sha")]).await;
        f.scheduler.sync_addon(&addon).await.unwrap();
        let reloaded = f.repo.find_version_by_name("my-addon", "master").await.unwrap().unwrap();
        assert_eq!(reloaded.id, version.id);
        assert_eq!(reloaded.last_seen_commit(), Some("new-sha"));
        assert!(reloaded.built_at.is_some());
        assert_eq!(f.builder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_build_failure_still_advances_bookkeeping() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let host = Arc::new(MockHost::new());
        let registry = Arc::new(MockRegistry::new());
        let shutdown = CancellationToken::new();
        let scheduler = BranchSyncScheduler::new(
            repo.clone(),
            host.clone(),
            registry,
            Arc::new(MockBuilder::failing()),
            settings(),
            shutdown,
        );
        let addon = addon(&repo, "my-addon").await;
        host.set_branches("owner/my-addon", vec![Branch::new("master", "new-sha")]).await;
        scheduler.sync_addon(&addon).await.unwrap();
        let version = repo.find_version_by_name("my-addon", "master").await.unwrap().unwrap();
        // Commit and timestamp advanced; the bundle location did not.
        assert_eq!(version.last_seen_commit(), Some("new-sha"));
        assert!(version.built_at.is_some());
        assert!(version.docs_url.is_none());
    }

    #[tokio::test]
    async fn test_config_refresh_is_persisted_and_drives_latest() {
        let f = fixture().await;
        let addon = addon(&f.repo, "my-addon").await;
        f.host
            .set_docs_config(
                "owner/my-addon",
                r#"{ "branches": [ { "branchName": "stable", "latest": true } ] }"#.as_bytes(),
            )
            .await;
        f.host
            .set_branches("owner/my-addon", vec![Branch::new("stable", "s-sha"), Branch::new("master", "m-sha")])
            .await;
        f.scheduler.sync_addon(&addon).await.unwrap();
        // The refreshed config was stored.
        let reloaded = f.repo.find_addon("my-addon").await.unwrap().unwrap();
        assert_eq!(reloaded.docs.latest_branch().unwrap().branch_name, "stable");
        // And the explicit override drove the latest alias.
        let alias = f.repo.find_alias("my-addon", "latest").await.unwrap().unwrap();
        let stable = f.repo.find_version_by_name("my-addon", "stable").await.unwrap().unwrap();
        assert_eq!(alias.version_id, stable.id);
    }

    #[tokio::test]
    async fn test_host_failure_is_not_fatal() {
        let f = fixture().await;
        let addon = addon(&f.repo, "my-addon").await;
        f.host.break_repo("owner/my-addon").await;
        let error = f.scheduler.sync_addon(&addon).await.unwrap_err();
        assert!(!error.is_fatal());
    }

    #[tokio::test]
    async fn test_run_cycles_and_marks_addons_checked() {
        let f = fixture().await;
        addon(&f.repo, "my-addon").await;
        f.host.set_branches("owner/my-addon", vec![Branch::new("master", "m-sha")]).await;
        let handle = tokio::spawn(f.scheduler.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.shutdown.cancel();
        handle.await.unwrap().unwrap();
        let reloaded = f.repo.find_addon("my-addon").await.unwrap().unwrap();
        assert!(reloaded.checked_at.is_some());
        assert_eq!(f.repo.branch_versions("my-addon").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_survives_empty_database() {
        let f = fixture().await;
        let handle = tokio::spawn(f.scheduler.run());
        // No addons at all: the loop idles on the startup delay.
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
