mod addon;
mod alias;
mod version;

pub use self::addon::{Addon, NewAddon};
pub(crate) use self::addon::AddonRow;
pub use self::alias::VersionAlias;
pub(crate) use self::alias::AliasRow;
pub use self::version::{Version, VersionSource};
pub(crate) use self::version::VersionRow;
