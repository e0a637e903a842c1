use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use time::UtcDateTime;

/// Where a version's documentation comes from.
///
/// The two kinds are disjoint and owned by different pipelines: published
/// versions belong to the change follower, branch versions to the branch
/// poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// A registry release; `name` is its semver string.
    Published { tarball_url: String },
    /// A tracked source-control branch; `name` is the branch name.
    Branch {
        last_seen_commit: String,
        display_name: Option<String>,
    },
}

/// One documentation-bearing artifact for an addon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub id: i64,
    pub addon: String,
    /// Version string (published) or branch name (branch).
    pub name: String,
    pub source: VersionSource,
    /// Null until build bookkeeping first advances.
    pub built_at: Option<UtcDateTime>,
    /// Null until a build first succeeds.
    pub docs_url: Option<String>,
}

impl Version {
    pub fn is_branch(&self) -> bool {
        matches!(self.source, VersionSource::Branch { .. })
    }

    /// The last commit seen on this branch version, if it is one.
    pub fn last_seen_commit(&self) -> Option<&str> {
        match &self.source {
            VersionSource::Branch { last_seen_commit, .. } => Some(last_seen_commit),
            VersionSource::Published { .. } => None,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub(crate) id: i64,
    pub(crate) addon: String,
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) is_branch: i64,
    pub(crate) tarball_url: Option<String>,
    pub(crate) last_seen_commit: Option<String>,
    pub(crate) built_at: Option<i64>,
    pub(crate) docs_url: Option<String>,
}

impl TryFrom<VersionRow> for Version {
    type Error = Error;
    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        let source = match row.is_branch != 0 {
            true => VersionSource::Branch {
                last_seen_commit: row.last_seen_commit.ok_or_raise(|| ErrorKind::InvalidData("last seen commit"))?,
                display_name: row.display_name,
            },
            false => VersionSource::Published {
                tarball_url: row.tarball_url.ok_or_raise(|| ErrorKind::InvalidData("tarball url"))?,
            },
        };
        Ok(Self {
            id: row.id,
            addon: row.addon,
            name: row.name,
            source,
            built_at: row
                .built_at
                .map(|ts| UtcDateTime::from_unix_timestamp(ts).or_raise(|| ErrorKind::InvalidData("built at")))
                .transpose()?,
            docs_url: row.docs_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_row_to_model() {
        let row = VersionRow {
            id: 1,
            addon: "my-addon".to_string(),
            name: "1.2.3".to_string(),
            display_name: None,
            is_branch: 0,
            tarball_url: Some("https://registry.test/my-addon/-/my-addon-1.2.3.tgz".to_string()),
            last_seen_commit: None,
            built_at: Some(1771177811),
            docs_url: Some("file:///data/docs.json".to_string()),
        };
        let version = Version::try_from(row).unwrap();
        assert!(!version.is_branch());
        assert_eq!(version.last_seen_commit(), None);
        assert!(matches!(version.source, VersionSource::Published { .. }));
    }

    #[test]
    fn test_branch_row_to_model() {
        let row = VersionRow {
            id: 2,
            addon: "my-addon".to_string(),
            name: "master".to_string(),
            display_name: Some("master".to_string()),
            is_branch: 1,
            tarball_url: None,
            last_seen_commit: Some("abc123".to_string()),
            built_at: None,
            docs_url: None,
        };
        let version = Version::try_from(row).unwrap();
        assert!(version.is_branch());
        assert_eq!(version.last_seen_commit(), Some("abc123"));
    }

    #[test]
    fn test_branch_row_requires_commit() {
        let row = VersionRow {
            id: 3,
            addon: "my-addon".to_string(),
            name: "master".to_string(),
            display_name: None,
            is_branch: 1,
            tarball_url: None,
            last_seen_commit: None,
            built_at: None,
            docs_url: None,
        };
        assert!(Version::try_from(row).is_err());
    }
}
