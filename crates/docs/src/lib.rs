//! Documentation build pipeline.
//!
//! Turns a source archive (a published tarball or a branch snapshot) into a
//! stored documentation bundle:
//!
//! 1. fetch + unpack the archive into a scratch directory,
//! 2. load the in-tree docs configuration (merged over the addon's defaults),
//! 3. bail out quietly when the tree carries no documentation sources,
//! 4. run the [`DocExtractor`] capability and persist the bundle through a
//!    [`FileStore`](drydock_storage::FileStore).
//!
//! The extractor itself is an external capability: this crate defines the
//! boundary and ships a small filesystem-walking default so the daemon is
//! runnable end to end.

mod builder;
mod config;
pub mod error;
mod extract;
mod fetch;

pub use crate::builder::{BuilderHandle, BuiltDocs, DocsBuilder, HttpDocsBuilder, SourceRef};
#[cfg(feature = "mock")]
pub use crate::builder::{BuildCall, MockBuilder};
pub use crate::config::{BranchConfig, DocsConfig, DocsConfigPatch, Granularity, VersionStrategy};
pub use crate::extract::{DocExtractor, DocsBundle, ExtractRequest, ExtractorHandle, PagesExtractor};
#[cfg(feature = "mock")]
pub use crate::extract::MockExtractor;
pub use crate::fetch::{SourceTree, fetch_archive};
