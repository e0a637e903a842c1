//! The `latest` alias resolver and the shared alias write path.
//!
//! Aliasing is where the two pipelines converge: whenever either one mutates
//! version data for an addon, `latest` is re-resolved. The decision itself
//! is a pure function over the addon's configuration and known versions,
//! evaluated in strict priority order — first matching rule wins, with no
//! fallthrough once matched.

use crate::error::{ErrorKind, Result};
use drydock_docs::{DocsConfig, VersionStrategy};
use drydock_store::{Addon, Repository, Version};
use exn::ResultExt;

/// The branch the `branches-over-tags` strategy falls back to.
const FALLBACK_BRANCH: &str = "master";

/// Pick the version name the `latest` alias should reference.
///
/// Priority order:
/// 1. a branch explicitly configured `latest: true`,
/// 2. a tracked branch whose name, read as a semver range (`2.x`), is
///    satisfied by the registry's `latest` dist-tag,
/// 3. the `master` branch, when the addon has a repository and prefers
///    branches over tags,
/// 4. the published version exactly matching the `latest` dist-tag,
/// 5. nothing — the caller leaves any existing alias untouched.
pub fn choose_latest(
    config: &DocsConfig,
    has_repo: bool,
    branch_versions: &[Version],
    published_names: &[String],
    dist_latest: Option<&str>,
) -> Option<String> {
    // Rule 1: explicit override.
    if let Some(branch) = config.latest_branch() {
        return Some(branch.branch_name.clone());
    }
    // Rule 2: a tracked branch subsumes the registry's latest version.
    if let Some(tagged) = dist_latest.and_then(|tag| tag.parse::<semver::Version>().ok()) {
        for version in branch_versions {
            if branch_range(&version.name).is_some_and(|range| range.matches(&tagged)) {
                return Some(version.name.clone());
            }
        }
    }
    // Rule 3: branches win by strategy; master is assumed trackable.
    if has_repo && config.version_strategy == VersionStrategy::BranchesOverTags {
        return Some(FALLBACK_BRANCH.to_string());
    }
    // Rule 4: fall back to the tagged release itself.
    if let Some(tag) = dist_latest
        && published_names.iter().any(|name| name == tag)
    {
        return Some(tag.to_string());
    }
    None
}

/// Read a branch name as a semver range. A name that is itself an exact
/// version ("1.2.3") means exactly that version, not the caret range Cargo
/// would default to; anything unparseable is no range at all.
fn branch_range(name: &str) -> Option<semver::VersionReq> {
    match name.parse::<semver::Version>() {
        Ok(exact) => semver::VersionReq::parse(&format!("={exact}")).ok(),
        Err(_) => name.parse::<semver::VersionReq>().ok(),
    }
}

/// Applies alias decisions to the store.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    repo: Repository,
}

impl AliasResolver {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// The shared write path for any alias (dist-tags included): look the
    /// target version up by name, retarget the existing (addon, alias) row
    /// or create it. A nonexistent target is a warning and a no-op — aliases
    /// must never dangle.
    pub async fn create_or_update(&self, addon: &str, alias: &str, version_name: &str) -> Result<()> {
        let Some(version) = self
            .repo
            .find_version_by_name(addon, version_name)
            .await
            .or_raise(|| ErrorKind::Store)?
        else {
            tracing::warn!(
                addon,
                alias,
                version = version_name,
                "cannot alias to a version that does not exist"
            );
            return Ok(());
        };
        self.repo.set_alias(addon, alias, version.id).await.or_raise(|| ErrorKind::Store)
    }

    /// Re-resolve the `latest` alias for an addon.
    ///
    /// `config` is passed explicitly because the branch poller resolves with
    /// a configuration fresher than the one stored on `addon`.
    pub async fn resolve_latest(&self, addon: &Addon, config: &DocsConfig, dist_latest: Option<&str>) -> Result<()> {
        let branch_versions = self.repo.branch_versions(&addon.name).await.or_raise(|| ErrorKind::Store)?;
        let published_names = self
            .repo
            .published_version_names(&addon.name)
            .await
            .or_raise(|| ErrorKind::Store)?;
        match choose_latest(config, addon.repo_slug.is_some(), &branch_versions, &published_names, dist_latest) {
            Some(target) => {
                tracing::debug!(addon = %addon.name, target, "resolved latest alias");
                self.create_or_update(&addon.name, "latest", &target).await
            },
            None => {
                tracing::error!(
                    addon = %addon.name,
                    "no rule matched while resolving the latest alias; leaving it unchanged"
                );
                Ok(())
            },
        }
    }
}
