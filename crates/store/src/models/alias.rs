/// A named pointer (`latest`, or any dist-tag) to exactly one version of an
/// addon. At most one row exists per (addon, alias); re-resolution retargets
/// the existing row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VersionAlias {
    pub id: i64,
    pub addon: String,
    pub alias: String,
    pub version_id: i64,
}

// Aliases are stored exactly as modeled; the row type is the model.
pub(crate) type AliasRow = VersionAlias;
