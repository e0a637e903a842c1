//! The addon synchronization engine.
//!
//! Two perpetual tasks keep the store converged with the outside world:
//!
//! - [`ChangeFollower`] consumes the registry's ordered change feed,
//!   registering addons, creating published versions, building their docs
//!   and re-resolving aliases. It resumes from a persisted sequence cursor
//!   and backfills on first run.
//! - [`BranchSyncScheduler`] round-robins over addons with a linked
//!   repository, three-way-diffs live branches against tracked branch
//!   versions, and paces itself against the code host's remaining rate-limit
//!   budget.
//!
//! Both converge through the [`AliasResolver`], which decides what `latest`
//! should point at. The pipelines own disjoint version rows (published vs
//! branch-sourced) and all alias writes are idempotent upserts, so no
//! cross-task locking is needed.

pub mod alias;
pub mod diff;
pub mod error;
mod follower;
mod pacing;
mod scheduler;

pub use crate::alias::AliasResolver;
pub use crate::diff::BranchAction;
pub use crate::follower::{ChangeFollower, FollowerSettings};
pub use crate::pacing::Pacing;
pub use crate::scheduler::{BranchSyncScheduler, SchedulerSettings};
