use crate::error::{Error, ErrorKind};
use drydock_docs::{BranchConfig, DocsConfig, Granularity, VersionStrategy};
use exn::ResultExt;
use time::UtcDateTime;

/// A tracked addon package.
#[derive(Debug, Clone, PartialEq)]
pub struct Addon {
    /// Registry package name; also the primary identifier.
    pub name: String,
    pub description: Option<String>,
    /// `owner/repo` slug of the linked source repository, when one could be
    /// derived from the package metadata.
    pub repo_slug: Option<String>,
    /// Docs configuration snapshot, refreshed from the default branch.
    pub docs: DocsConfig,
    /// When the branch poller last examined this addon.
    pub checked_at: Option<UtcDateTime>,
}

/// Fields needed to register a previously unseen addon.
///
/// The docs configuration starts at the built-in defaults; the branch poller
/// refreshes it from the repository later.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAddon {
    pub name: String,
    pub description: Option<String>,
    pub repo_slug: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct AddonRow {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) repo_slug: Option<String>,
    pub(crate) docs_granularity: String,
    pub(crate) docs_version_strategy: String,
    pub(crate) docs_semver_branches: i64,
    pub(crate) docs_branches: String,
    pub(crate) checked_at: Option<i64>,
}

impl TryFrom<AddonRow> for Addon {
    type Error = Error;
    fn try_from(row: AddonRow) -> Result<Self, Self::Error> {
        let branches: Vec<BranchConfig> =
            serde_json::from_str(&row.docs_branches).or_raise(|| ErrorKind::InvalidData("docs branches"))?;
        Ok(Self {
            name: row.name,
            description: row.description,
            repo_slug: row.repo_slug,
            docs: DocsConfig {
                granularity: row
                    .docs_granularity
                    .parse::<Granularity>()
                    .or_raise(|| ErrorKind::InvalidData("docs granularity"))?,
                version_strategy: row
                    .docs_version_strategy
                    .parse::<VersionStrategy>()
                    .or_raise(|| ErrorKind::InvalidData("docs version strategy"))?,
                semver_branches: row.docs_semver_branches != 0,
                branches,
                ..DocsConfig::default()
            },
            checked_at: row
                .checked_at
                .map(|ts| UtcDateTime::from_unix_timestamp(ts).or_raise(|| ErrorKind::InvalidData("checked at")))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_docs::{Granularity, VersionStrategy};

    #[test]
    fn test_row_to_model() {
        let row = AddonRow {
            name: "my-addon".to_string(),
            description: Some("Does addon things".to_string()),
            repo_slug: Some("owner/my-addon".to_string()),
            docs_granularity: "major".to_string(),
            docs_version_strategy: "tags-over-branches".to_string(),
            docs_semver_branches: 0,
            docs_branches: r#"[{"branchName":"main","latest":true}]"#.to_string(),
            checked_at: Some(1771177811),
        };
        let addon = Addon::try_from(row).unwrap();
        assert_eq!(addon.docs.granularity, Granularity::Major);
        assert_eq!(addon.docs.version_strategy, VersionStrategy::TagsOverBranches);
        assert!(!addon.docs.semver_branches);
        assert_eq!(addon.docs.latest_branch().unwrap().branch_name, "main");
        assert_eq!(addon.checked_at.unwrap().unix_timestamp(), 1771177811);
    }

    #[test]
    fn test_row_rejects_bad_enum() {
        let row = AddonRow {
            name: "my-addon".to_string(),
            description: None,
            repo_slug: None,
            docs_granularity: "hourly".to_string(),
            docs_version_strategy: "branches-over-tags".to_string(),
            docs_semver_branches: 1,
            docs_branches: "[]".to_string(),
            checked_at: None,
        };
        assert!(Addon::try_from(row).is_err());
    }
}
