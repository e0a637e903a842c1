//! Repository for the addon synchronization engine's entities.
//!
//! Explicit query methods instead of relation traversal: ownership is a
//! foreign-key field, and every write that could violate a uniqueness
//! invariant is expressed as a conditional upsert so that re-processing the
//! same update is a no-op rather than a duplicate row.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Addon, AddonRow, AliasRow, NewAddon, Version, VersionAlias, VersionRow};
use drydock_docs::DocsConfig;
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Query interface over the store database.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn branches_json(config: &DocsConfig) -> Result<String> {
        serde_json::to_string(&config.branches).or_raise(|| ErrorKind::InvalidData("docs branches"))
    }

    // =========================================================================
    // Addons
    // =========================================================================

    pub async fn find_addon(&self, name: &str) -> Result<Option<Addon>> {
        let row: Option<AddonRow> = sqlx::query_as("SELECT * FROM addons WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Addon::try_from).transpose()
    }

    /// Register an addon if it isn't tracked yet, and return the tracked row
    /// either way. An existing addon is left untouched — its docs config
    /// snapshot belongs to the branch poller's refresh cycle.
    pub async fn find_or_create_addon(&self, new: &NewAddon) -> Result<Addon> {
        let defaults = DocsConfig::default();
        sqlx::query(
            r#"
            INSERT INTO addons (name, description, repo_slug, docs_granularity, docs_version_strategy, docs_semver_branches, docs_branches)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.repo_slug)
        .bind(defaults.granularity.as_str())
        .bind(defaults.version_strategy.as_str())
        .bind(i64::from(defaults.semver_branches))
        .bind(Self::branches_json(&defaults)?)
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        self.find_addon(&new.name).await?.ok_or_raise(|| ErrorKind::Database)
    }

    /// Persist a refreshed docs configuration snapshot.
    pub async fn update_docs_config(&self, name: &str, config: &DocsConfig) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE addons
            SET docs_granularity = ?, docs_version_strategy = ?, docs_semver_branches = ?, docs_branches = ?
            WHERE name = ?
            "#,
        )
        .bind(config.granularity.as_str())
        .bind(config.version_strategy.as_str())
        .bind(i64::from(config.semver_branches))
        .bind(Self::branches_json(config)?)
        .bind(name)
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Record that the branch poller finished a cycle for this addon.
    pub async fn touch_checked(&self, name: &str, at: UtcDateTime) -> Result<()> {
        sqlx::query("UPDATE addons SET checked_at = ? WHERE name = ?")
            .bind(at.unix_timestamp())
            .bind(name)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// The least-recently-checked addon that has a linked repository.
    ///
    /// NULL sorts first under ASC in SQLite, so never-checked addons are
    /// served before any previously checked one.
    pub async fn stalest_addon_with_repo(&self) -> Result<Option<Addon>> {
        let row: Option<AddonRow> = sqlx::query_as(
            r#"
            SELECT * FROM addons
            WHERE repo_slug IS NOT NULL
            ORDER BY checked_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        row.map(Addon::try_from).transpose()
    }

    // =========================================================================
    // Versions
    // =========================================================================

    async fn version_by_identity(&self, addon: &str, name: &str, is_branch: bool) -> Result<Option<Version>> {
        let row: Option<VersionRow> =
            sqlx::query_as("SELECT * FROM versions WHERE addon = ? AND name = ? AND is_branch = ?")
                .bind(addon)
                .bind(name)
                .bind(i64::from(is_branch))
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        row.map(Version::try_from).transpose()
    }

    /// Find-or-create a published version. Re-processing the same release is
    /// a no-op thanks to the identity index.
    pub async fn create_published_version(&self, addon: &str, name: &str, tarball_url: &str) -> Result<Version> {
        sqlx::query(
            r#"
            INSERT INTO versions (addon, name, is_branch, tarball_url)
            VALUES (?, ?, 0, ?)
            ON CONFLICT (addon, name, is_branch) DO NOTHING
            "#,
        )
        .bind(addon)
        .bind(name)
        .bind(tarball_url)
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        self.version_by_identity(addon, name, false).await?.ok_or_raise(|| ErrorKind::Database)
    }

    /// Find-or-create a branch version. The commit is only written on
    /// creation — updating an already-tracked branch goes through
    /// [`advance_branch`](Self::advance_branch).
    pub async fn create_branch_version(
        &self,
        addon: &str,
        branch: &str,
        display_name: Option<&str>,
        commit: &str,
    ) -> Result<Version> {
        sqlx::query(
            r#"
            INSERT INTO versions (addon, name, display_name, is_branch, last_seen_commit)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT (addon, name, is_branch) DO NOTHING
            "#,
        )
        .bind(addon)
        .bind(branch)
        .bind(display_name)
        .bind(commit)
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        self.version_by_identity(addon, branch, true).await?.ok_or_raise(|| ErrorKind::Database)
    }

    /// Version strings of all published versions for an addon.
    ///
    /// This is the "already known" side of the change follower's
    /// set-difference; branch versions are deliberately excluded.
    pub async fn published_version_names(&self, addon: &str) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM versions WHERE addon = ? AND is_branch = 0 ORDER BY id")
                .bind(addon)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        Ok(names)
    }

    /// All branch-sourced versions for an addon.
    pub async fn branch_versions(&self, addon: &str) -> Result<Vec<Version>> {
        let rows: Vec<VersionRow> =
            sqlx::query_as("SELECT * FROM versions WHERE addon = ? AND is_branch = 1 ORDER BY id")
                .bind(addon)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Version::try_from).collect()
    }

    /// Look a version up by its name (version string or branch name).
    ///
    /// On the rare name collision between a branch and a published version,
    /// the branch wins: the alias resolver's branch rules take priority over
    /// its tag rule.
    pub async fn find_version_by_name(&self, addon: &str, name: &str) -> Result<Option<Version>> {
        let row: Option<VersionRow> = sqlx::query_as(
            r#"
            SELECT * FROM versions
            WHERE addon = ? AND name = ?
            ORDER BY is_branch DESC, id
            LIMIT 1
            "#,
        )
        .bind(addon)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        row.map(Version::try_from).transpose()
    }

    /// Record a successful build: bundle location plus build timestamp.
    pub async fn record_build(&self, version_id: i64, docs_url: &str, built_at: UtcDateTime) -> Result<()> {
        sqlx::query("UPDATE versions SET docs_url = ?, built_at = ? WHERE id = ?")
            .bind(docs_url)
            .bind(built_at.unix_timestamp())
            .bind(version_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Advance a branch version's bookkeeping: last seen commit and build
    /// timestamp. Runs regardless of build success, so a broken branch isn't
    /// rebuilt every cycle.
    pub async fn advance_branch(&self, version_id: i64, commit: &str, seen_at: UtcDateTime) -> Result<()> {
        sqlx::query("UPDATE versions SET last_seen_commit = ?, built_at = ? WHERE id = ? AND is_branch = 1")
            .bind(commit)
            .bind(seen_at.unix_timestamp())
            .bind(version_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Delete a version (used when a tracked branch disappears upstream).
    ///
    /// Returns `true` if a row was deleted. Aliases pointing at the version
    /// go with it via CASCADE.
    pub async fn delete_version(&self, version_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM versions WHERE id = ?")
            .bind(version_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    /// Point (addon, alias) at a version, retargeting any existing row.
    /// The UNIQUE (addon, alias) constraint guarantees a single row per pair.
    pub async fn set_alias(&self, addon: &str, alias: &str, version_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO version_aliases (addon, alias, version_id)
            VALUES (?, ?, ?)
            ON CONFLICT (addon, alias) DO UPDATE SET version_id = excluded.version_id
            "#,
        )
        .bind(addon)
        .bind(alias)
        .bind(version_id)
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn find_alias(&self, addon: &str, alias: &str) -> Result<Option<VersionAlias>> {
        let row: Option<AliasRow> = sqlx::query_as("SELECT * FROM version_aliases WHERE addon = ? AND alias = ?")
            .bind(addon)
            .bind(alias)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row)
    }

    pub async fn aliases_for(&self, addon: &str) -> Result<Vec<VersionAlias>> {
        let rows: Vec<AliasRow> = sqlx::query_as("SELECT * FROM version_aliases WHERE addon = ? ORDER BY alias")
            .bind(addon)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows)
    }

    // =========================================================================
    // Change cursor
    // =========================================================================

    /// The highest fully-processed registry change sequence, if any change
    /// has ever been processed.
    pub async fn last_sequence(&self) -> Result<Option<u64>> {
        let row: Option<i64> = sqlx::query_scalar("SELECT last_sequence FROM registry_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(|seq| u64::try_from(seq).or_raise(|| ErrorKind::InvalidData("sequence")))
            .transpose()
    }

    /// Advance the cursor to `sequence`, but only forward. Out-of-order or
    /// duplicate deliveries are no-ops at the SQL level.
    ///
    /// Returns `true` if the cursor actually moved.
    pub async fn advance_sequence(&self, sequence: u64) -> Result<bool> {
        let sequence = i64::try_from(sequence).or_raise(|| ErrorKind::InvalidData("sequence"))?;
        let result = sqlx::query(
            r#"
            INSERT INTO registry_cursor (id, last_sequence)
            VALUES (1, ?)
            ON CONFLICT (id) DO UPDATE SET last_sequence = excluded.last_sequence
            WHERE excluded.last_sequence > registry_cursor.last_sequence
            "#,
        )
        .bind(sequence)
        .execute(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
