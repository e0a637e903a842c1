//! Three-way branch diff.
//!
//! Live branches on the code host and tracked branch versions in the store
//! are reconciled by branch name into three explicit action sets, in the
//! order they're applied: deletes, creates, updates. A tracked branch whose
//! head commit hasn't moved produces no action at all.

use drydock_github::Branch;
use drydock_store::Version;
use std::collections::{HashMap, HashSet};

/// One reconciliation step for a single branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchAction {
    /// The upstream branch disappeared; delete its version.
    Delete(Version),
    /// A new upstream branch; create a version tracking it.
    Create(Branch),
    /// The tracked branch moved; rebuild and record the new head commit.
    Update { version: Version, commit: String },
}

/// Plan the reconciliation of `tracked` branch versions against `live`
/// branches. Non-branch versions in `tracked` are ignored defensively —
/// published versions are never the poller's to touch.
pub fn plan(live: &[Branch], tracked: Vec<Version>) -> Vec<BranchAction> {
    let live_by_name: HashMap<&str, &Branch> = live.iter().map(|branch| (branch.name.as_str(), branch)).collect();
    let tracked_names: HashSet<String> = tracked.iter().map(|version| version.name.clone()).collect();

    let mut deletes = Vec::new();
    let mut updates = Vec::new();
    for version in tracked.into_iter().filter(Version::is_branch) {
        match live_by_name.get(version.name.as_str()) {
            None => deletes.push(BranchAction::Delete(version)),
            Some(branch) => {
                if version.last_seen_commit() != Some(branch.commit.sha.as_str()) {
                    let commit = branch.commit.sha.clone();
                    updates.push(BranchAction::Update { version, commit });
                }
                // Same commit: idempotent no-op, not even a bookkeeping write.
            },
        }
    }
    let creates = live
        .iter()
        .filter(|branch| !tracked_names.contains(&branch.name))
        .map(|branch| BranchAction::Create(branch.clone()));

    deletes.into_iter().chain(creates).chain(updates).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_store::VersionSource;

    fn tracked(id: i64, name: &str, commit: &str) -> Version {
        Version {
            id,
            addon: "my-addon".to_string(),
            name: name.to_string(),
            source: VersionSource::Branch {
                last_seen_commit: commit.to_string(),
                display_name: None,
            },
            built_at: None,
            docs_url: None,
        }
    }

    #[test]
    fn test_three_way_diff() {
        // Tracked {A, B}, live {B, C}: delete A, create C, leave B alone
        // while its commit is unchanged.
        let live = vec![Branch::new("B", "b-sha"), Branch::new("C", "c-sha")];
        let actions = plan(&live, vec![tracked(1, "A", "a-sha"), tracked(2, "B", "b-sha")]);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], BranchAction::Delete(version) if version.name == "A"));
        assert!(matches!(&actions[1], BranchAction::Create(branch) if branch.name == "C"));
    }

    #[test]
    fn test_moved_commit_becomes_update() {
        let live = vec![Branch::new("B", "new-sha")];
        let actions = plan(&live, vec![tracked(2, "B", "old-sha")]);
        assert_eq!(
            actions,
            vec![BranchAction::Update {
                version: tracked(2, "B", "old-sha"),
                commit: "new-sha".to_string(),
            }]
        );
    }

    #[test]
    fn test_unchanged_commit_is_a_no_op() {
        let live = vec![Branch::new("B", "same-sha")];
        assert!(plan(&live, vec![tracked(2, "B", "same-sha")]).is_empty());
    }

    #[test]
    fn test_deletes_come_before_creates_and_updates() {
        let live = vec![Branch::new("B", "new-sha"), Branch::new("C", "c-sha")];
        let actions = plan(&live, vec![tracked(1, "A", "a-sha"), tracked(2, "B", "old-sha")]);
        assert!(matches!(actions[0], BranchAction::Delete(_)));
        assert!(matches!(actions[1], BranchAction::Create(_)));
        assert!(matches!(actions[2], BranchAction::Update { .. }));
    }

    #[test]
    fn test_published_versions_are_ignored() {
        let published = Version {
            id: 9,
            addon: "my-addon".to_string(),
            name: "1.0.0".to_string(),
            source: VersionSource::Published {
                tarball_url: "https://registry.test/a.tgz".to_string(),
            },
            built_at: None,
            docs_url: None,
        };
        assert!(plan(&[], vec![published]).is_empty());
    }

    #[test]
    fn test_empty_sets() {
        assert!(plan(&[], vec![]).is_empty());
        let live = vec![Branch::new("master", "sha")];
        assert_eq!(plan(&live, vec![]).len(), 1);
    }
}
