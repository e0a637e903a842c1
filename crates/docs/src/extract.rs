//! The documentation extraction capability.
//!
//! Extraction internals are not this system's concern: the [`DocExtractor`]
//! trait is the boundary, and anything that can turn a source tree into a
//! JSON bundle can sit behind it. [`PagesExtractor`] is the shipped default —
//! it collects hand-written pages and enumerates API source files, which is
//! enough to serve a docs site.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything an extractor needs to know about one build.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    /// Root of the extracted source tree.
    pub dir: &'a Path,
    /// Directory (relative to `dir`) holding hand-written pages.
    pub pages_dir: &'a str,
    /// Directories (relative to `dir`) scanned for API sources.
    pub source_dirs: &'a [String],
    pub project_name: &'a str,
    pub project_version: &'a str,
}

/// An extracted documentation bundle, ready for upload.
///
/// The bundle's internal structure belongs to the extractor and the docs
/// frontend; this system only moves it around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsBundle(pub serde_json::Value);

impl DocsBundle {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).or_raise(|| ErrorKind::Serialize)
    }
}

/// External capability turning a source directory into a documentation bundle.
#[async_trait]
pub trait DocExtractor: Send + Sync {
    async fn extract(&self, request: ExtractRequest<'_>) -> Result<DocsBundle>;
}

pub type ExtractorHandle = Arc<dyn DocExtractor + Send + Sync>;

/// Default extractor: collects markdown pages and lists API source files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PagesExtractor;

#[async_trait]
impl DocExtractor for PagesExtractor {
    async fn extract(&self, request: ExtractRequest<'_>) -> Result<DocsBundle> {
        let dir = request.dir.to_path_buf();
        let pages_dir = dir.join(request.pages_dir);
        let source_dirs: Vec<PathBuf> = request.source_dirs.iter().map(|d| dir.join(d)).collect();
        let name = request.project_name.to_string();
        let version = request.project_version.to_string();
        // Directory walks are blocking I/O; keep them off the async runtime.
        let value = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
            let mut pages = Vec::new();
            for path in walk_files(&pages_dir)? {
                if path.extension().is_some_and(|e| e == "md") {
                    let body = std::fs::read_to_string(&path).or_raise(|| ErrorKind::Extract)?;
                    let relative = path.strip_prefix(&pages_dir).unwrap_or(&path);
                    pages.push(serde_json::json!({
                        "path": relative.to_string_lossy(),
                        "body": body,
                    }));
                }
            }
            let mut sources = Vec::new();
            for source_dir in &source_dirs {
                for path in walk_files(source_dir)? {
                    let relative = path.strip_prefix(&dir).unwrap_or(&path);
                    sources.push(relative.to_string_lossy().into_owned());
                }
            }
            sources.sort();
            Ok(serde_json::json!({
                "name": name,
                "version": version,
                "pages": pages,
                "sources": sources,
            }))
        })
        .await
        .or_raise(|| ErrorKind::Extract)??;
        Ok(DocsBundle(value))
    }
}

/// Depth-first file listing; a missing directory is just an empty listing.
fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err).or_raise(|| ErrorKind::Extract),
        };
        for entry in entries {
            let entry = entry.or_raise(|| ErrorKind::Extract)?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Canned extractor for tests: returns a fixed bundle and records requests.
#[cfg(feature = "mock")]
pub struct MockExtractor {
    bundle: serde_json::Value,
    fail: bool,
    requests: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(feature = "mock")]
impl MockExtractor {
    pub fn new() -> Self {
        Self {
            bundle: serde_json::json!({ "mock": true }),
            fail: false,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// An extractor whose every call fails.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    /// `(project_name, project_version)` pairs seen so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(feature = "mock")]
impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "mock")]
#[async_trait]
impl DocExtractor for MockExtractor {
    async fn extract(&self, request: ExtractRequest<'_>) -> Result<DocsBundle> {
        self.requests
            .lock()
            .unwrap()
            .push((request.project_name.to_string(), request.project_version.to_string()));
        if self.fail {
            exn::bail!(ErrorKind::Extract);
        }
        Ok(DocsBundle(self.bundle.clone()))
    }
}
