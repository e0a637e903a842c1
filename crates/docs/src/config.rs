//! Per-addon documentation configuration.
//!
//! Addons describe where their documentation lives in a `config/docs.json`
//! file at the root of their repository. The file is optional and partial:
//! whatever it specifies is merged over the built-in defaults (or over the
//! addon's previously stored configuration). A malformed file is treated the
//! same as a missing one.

use crate::error::{ErrorKind, Result};
use derive_more::{Display, Error};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Relative location of the docs config file within a source tree.
const CONFIG_PATH: &str = "config/docs.json";

/// How granular the published version list should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Major,
    Minor,
    Patch,
}

/// Which source wins when both a release tag and a branch could serve as the
/// `latest` documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStrategy {
    #[serde(rename = "branches-over-tags")]
    BranchesOverTags,
    #[serde(rename = "tags-over-branches")]
    TagsOverBranches,
}

/// Error parsing a stored enum value back out of the database.
#[derive(Debug, Display, Error)]
#[display("unrecognized value: {_0}")]
pub struct ParseEnumError(#[error(not(source))] String);

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }
}
impl FromStr for Granularity {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

impl VersionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BranchesOverTags => "branches-over-tags",
            Self::TagsOverBranches => "tags-over-branches",
        }
    }
}
impl FromStr for VersionStrategy {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "branches-over-tags" => Ok(Self::BranchesOverTags),
            "tags-over-branches" => Ok(Self::TagsOverBranches),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// An explicitly tracked branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Marks this branch as the forced target of the `latest` alias.
    #[serde(default)]
    pub latest: bool,
}

impl BranchConfig {
    pub fn named(branch_name: impl Into<String>) -> Self {
        Self {
            branch_name: branch_name.into(),
            display_name: None,
            latest: false,
        }
    }
}

/// Complete per-addon docs configuration.
///
/// The wire format (both the in-repo file and the raw fetch from the default
/// branch) is camelCase JSON; the store persists the same fields as discrete
/// columns plus a JSON branch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocsConfig {
    /// Directory holding hand-written documentation pages.
    pub pages_dir: String,
    /// Directories scanned for API documentation sources.
    pub source_dirs: Vec<String>,
    pub granularity: Granularity,
    pub version_strategy: VersionStrategy,
    /// Track any branch whose name is a valid semver string.
    pub semver_branches: bool,
    /// Branches tracked regardless of their name.
    pub branches: Vec<BranchConfig>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            pages_dir: "docs".to_string(),
            source_dirs: vec!["app".to_string(), "lib".to_string()],
            granularity: Granularity::Minor,
            version_strategy: VersionStrategy::BranchesOverTags,
            semver_branches: true,
            branches: vec![BranchConfig {
                branch_name: "master".to_string(),
                display_name: Some("master".to_string()),
                latest: false,
            }],
        }
    }
}

/// A partial docs configuration, as read from an addon repository.
///
/// Only the fields present in the file override the base configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocsConfigPatch {
    pages_dir: Option<String>,
    source_dirs: Option<Vec<String>>,
    granularity: Option<Granularity>,
    version_strategy: Option<VersionStrategy>,
    semver_branches: Option<bool>,
    branches: Option<Vec<BranchConfig>>,
}

impl DocsConfigPatch {
    /// Merge this patch over `base`, field by field.
    pub fn apply(self, base: &DocsConfig) -> DocsConfig {
        DocsConfig {
            pages_dir: self.pages_dir.unwrap_or_else(|| base.pages_dir.clone()),
            source_dirs: self.source_dirs.unwrap_or_else(|| base.source_dirs.clone()),
            granularity: self.granularity.unwrap_or(base.granularity),
            version_strategy: self.version_strategy.unwrap_or(base.version_strategy),
            semver_branches: self.semver_branches.unwrap_or(base.semver_branches),
            branches: self.branches.unwrap_or_else(|| base.branches.clone()),
        }
    }
}

impl DocsConfig {
    /// Parse raw config-file bytes and merge them over `base`.
    pub fn merged(raw: &[u8], base: &DocsConfig) -> Result<DocsConfig> {
        let patch: DocsConfigPatch = serde_json::from_slice(raw).or_raise(|| ErrorKind::Config)?;
        Ok(patch.apply(base))
    }

    /// Load `config/docs.json` from an extracted source tree, merged over
    /// `base`. A missing or malformed file falls back to `base` unchanged —
    /// an addon without a config file is the common case, not an error.
    pub fn load_from_tree(dir: &Path, base: &DocsConfig) -> DocsConfig {
        let path = dir.join(CONFIG_PATH);
        match std::fs::read(&path) {
            Ok(raw) => match Self::merged(&raw, base) {
                Ok(config) => config,
                Err(_) => {
                    tracing::debug!(path = %path.display(), "malformed docs config, using defaults");
                    base.clone()
                },
            },
            Err(_) => base.clone(),
        }
    }

    /// The branch explicitly flagged `latest: true`, if any.
    pub fn latest_branch(&self) -> Option<&BranchConfig> {
        self.branches.iter().find(|b| b.latest)
    }

    /// Configured display name for a branch, if one is set.
    pub fn display_name_for(&self, branch: &str) -> Option<&str> {
        self.branches
            .iter()
            .find(|b| b.branch_name == branch)
            .and_then(|b| b.display_name.as_deref())
    }

    /// Whether a live branch should be tracked as a version branch: either
    /// its name is a configured branch, or semver tracking is on and the
    /// name parses as an exact semver version.
    pub fn tracks_branch(&self, name: &str) -> bool {
        self.branches.iter().any(|b| b.branch_name == name)
            || (self.semver_branches && semver_valid(name))
    }
}

fn semver_valid(name: &str) -> bool {
    name.parse::<semver::Version>().is_ok()
}
