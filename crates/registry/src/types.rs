//! Wire types for the registry APIs.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// One entry from the registry change feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Change {
    pub seq: u64,
    /// The package name that changed.
    pub id: String,
}

/// A bounded batch of change-feed entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeBatch {
    #[serde(default)]
    pub results: Vec<Change>,
    pub last_seq: u64,
}

/// The tarball pointer of one published version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DistInfo {
    pub tarball: String,
}

/// A package's `repository` field, in either of its two wire shapes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RepositoryField {
    /// Shorthand: `"owner/repo"` or `"github:owner/repo"`.
    Shorthand(String),
    /// Structured: `{ "type": "git", "url": "https://github.com/owner/repo.git" }`.
    Structured {
        #[serde(default, rename = "type")]
        kind: Option<String>,
        url: String,
    },
}

static GITHUB_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com[:/]([^/]+/[^/]+?)(?:\.git)?/?$").unwrap());

impl RepositoryField {
    /// Derive an `owner/repo` slug, if this field points at a recognizable
    /// code-host location. Anything unparseable yields `None` — an addon
    /// without a slug simply never enters the branch poller's rotation.
    pub fn slug(&self) -> Option<String> {
        match self {
            Self::Shorthand(raw) => {
                if let Some(rest) = raw.strip_prefix("github:") {
                    return Some(rest.to_string());
                }
                // A plain "owner/repo" pair. Other hosts' shorthands
                // ("gitlab:owner/repo") keep their colon and are rejected.
                let mut segments = raw.split('/');
                match (segments.next(), segments.next(), segments.next()) {
                    (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() && !owner.contains(':') => {
                        Some(raw.clone())
                    },
                    _ => None,
                }
            },
            Self::Structured { kind, url } => {
                if kind.as_deref().is_some_and(|k| k != "git") {
                    return None;
                }
                GITHUB_URL.captures(url).map(|captures| captures[1].to_string())
            },
        }
    }
}

/// One published version's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionMetadata {
    pub version: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub dist: DistInfo,
    #[serde(default)]
    pub repository: Option<RepositoryField>,
}

/// Full package metadata: every version plus the dist-tags map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: HashMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,
}

impl PackageMetadata {
    /// The most-recently-published version: the `latest` dist-tag's target,
    /// falling back to the highest semver-parseable version key. A package
    /// with zero versions has no latest version.
    pub fn latest_version(&self) -> Option<&VersionMetadata> {
        if let Some(tagged) = self.dist_tags.get("latest").and_then(|tag| self.versions.get(tag)) {
            return Some(tagged);
        }
        self.versions
            .iter()
            .filter_map(|(key, meta)| key.parse::<semver::Version>().ok().map(|parsed| (parsed, meta)))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, meta)| meta)
    }

    /// Whether this package qualifies as an addon: its latest version's
    /// declared keywords must contain the marker.
    pub fn is_addon(&self, keyword: &str) -> bool {
        self.latest_version()
            .is_some_and(|version| version.keywords.iter().any(|k| k == keyword))
    }

    /// Repository slug derived from the latest version's repository field.
    pub fn repo_slug(&self) -> Option<String> {
        self.latest_version().and_then(|version| version.repository.as_ref()).and_then(RepositoryField::slug)
    }

    /// The `latest` dist-tag's version string, if the registry has one.
    pub fn dist_latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }
}
