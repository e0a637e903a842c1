//! The build-and-store glue shared by both sync pipelines.
//!
//! One call = one version's documentation: fetch the archive, figure out the
//! effective configuration, extract, upload. The caller decides what to do
//! with the outcome — the follower and the branch poller have different
//! bookkeeping rules for failed builds.

use crate::config::DocsConfig;
use crate::error::{ErrorKind, Result};
use crate::extract::{ExtractRequest, ExtractorHandle};
use crate::fetch::fetch_archive;
use async_trait::async_trait;
use derive_more::Display;
use drydock_storage::FilesHandle;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;

/// What a version's documentation was built from.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SourceRef {
    /// A published release, identified by its version string.
    #[display("release {_0}")]
    Release(String),
    /// A tracked branch, identified by its name.
    #[display("branch {_0}")]
    Branch(String),
}

impl SourceRef {
    pub fn release(name: impl Into<String>) -> Self {
        Self::Release(name.into())
    }

    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch(name.into())
    }

    /// The version string or branch name.
    pub fn name(&self) -> &str {
        match self {
            Self::Release(name) | Self::Branch(name) => name,
        }
    }

    /// Storage path segment: `release-{version}` or `branch-{name}`.
    fn path_segment(&self) -> String {
        match self {
            Self::Release(name) => format!("release-{name}"),
            Self::Branch(name) => format!("branch-{name}"),
        }
    }
}

/// A successfully stored documentation bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltDocs {
    /// Where the bundle was stored.
    pub docs_url: String,
    pub built_at: UtcDateTime,
}

/// Builds one version's documentation and stores the bundle.
///
/// `Ok(None)` means the source tree carries no documentation — a perfectly
/// normal state, distinct from a build failure.
#[async_trait]
pub trait DocsBuilder: Send + Sync {
    async fn build(
        &self,
        addon: &str,
        source: &SourceRef,
        archive_url: &str,
        config: &DocsConfig,
    ) -> Result<Option<BuiltDocs>>;
}

pub type BuilderHandle = Arc<dyn DocsBuilder + Send + Sync>;

/// The real pipeline: HTTP fetch → in-tree config → extract → upload.
pub struct HttpDocsBuilder {
    http: reqwest::Client,
    files: FilesHandle,
    extractor: ExtractorHandle,
    bucket: String,
}

impl HttpDocsBuilder {
    pub fn new(
        http: reqwest::Client,
        files: FilesHandle,
        extractor: ExtractorHandle,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            http,
            files,
            extractor,
            bucket: bucket.into(),
        }
    }

    /// Build from an already-unpacked tree. Split out from [`build`] so the
    /// pipeline below the network fetch is testable against a local dir.
    async fn build_from_tree(
        &self,
        addon: &str,
        source: &SourceRef,
        root: &Path,
        config: &DocsConfig,
    ) -> Result<Option<BuiltDocs>> {
        let config = DocsConfig::load_from_tree(root, config);
        let has_pages = root.join(&config.pages_dir).is_dir();
        let has_sources = config.source_dirs.iter().any(|d| root.join(d).is_dir());
        if !has_pages && !has_sources {
            tracing::debug!(addon, %source, "no documentation sources in tree, skipping upload");
            return Ok(None);
        }
        let bundle = self
            .extractor
            .extract(ExtractRequest {
                dir: root,
                pages_dir: &config.pages_dir,
                source_dirs: &config.source_dirs,
                project_name: addon,
                project_version: source.name(),
            })
            .await?;
        let data = bundle.to_bytes()?;
        let path = PathBuf::from(addon).join(source.path_segment()).join("docs.json");
        let docs_url = self
            .files
            .save(&self.bucket, &path, &data)
            .await
            .or_raise(|| ErrorKind::Store)?;
        tracing::info!(addon, %source, url = %docs_url, "documentation bundle stored");
        Ok(Some(BuiltDocs {
            docs_url,
            built_at: UtcDateTime::now(),
        }))
    }
}

#[async_trait]
impl DocsBuilder for HttpDocsBuilder {
    async fn build(
        &self,
        addon: &str,
        source: &SourceRef,
        archive_url: &str,
        config: &DocsConfig,
    ) -> Result<Option<BuiltDocs>> {
        let tree = fetch_archive(&self.http, archive_url).await?;
        self.build_from_tree(addon, source, tree.root(), config).await
    }
}

/// A call recorded by [`MockBuilder`].
#[cfg(feature = "mock")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCall {
    pub addon: String,
    pub source: SourceRef,
    pub archive_url: String,
}

#[cfg(feature = "mock")]
enum MockOutcome {
    Success,
    NoDocs,
    Failure,
}

/// Canned builder for tests: records calls, returns a configured outcome.
#[cfg(feature = "mock")]
pub struct MockBuilder {
    outcome: MockOutcome,
    calls: std::sync::Mutex<Vec<BuildCall>>,
}

#[cfg(feature = "mock")]
impl MockBuilder {
    pub fn new() -> Self {
        Self {
            outcome: MockOutcome::Success,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A builder that reports "no documentation" for every version.
    pub fn without_docs() -> Self {
        Self { outcome: MockOutcome::NoDocs, ..Self::new() }
    }

    /// A builder whose every build fails.
    pub fn failing() -> Self {
        Self { outcome: MockOutcome::Failure, ..Self::new() }
    }

    pub fn calls(&self) -> Vec<BuildCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(feature = "mock")]
impl Default for MockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "mock")]
#[async_trait]
impl DocsBuilder for MockBuilder {
    async fn build(
        &self,
        addon: &str,
        source: &SourceRef,
        archive_url: &str,
        _config: &DocsConfig,
    ) -> Result<Option<BuiltDocs>> {
        self.calls.lock().unwrap().push(BuildCall {
            addon: addon.to_string(),
            source: source.clone(),
            archive_url: archive_url.to_string(),
        });
        match self.outcome {
            MockOutcome::Success => Ok(Some(BuiltDocs {
                docs_url: format!("mock://docs/{}/{}/docs.json", addon, source.path_segment()),
                built_at: UtcDateTime::now(),
            })),
            MockOutcome::NoDocs => Ok(None),
            MockOutcome::Failure => exn::bail!(ErrorKind::Download(archive_url.to_string())),
        }
    }
}
