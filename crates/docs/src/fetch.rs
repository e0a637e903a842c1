//! Source archive fetching.
//!
//! Both published tarballs and branch snapshots arrive as gzipped tarballs;
//! they're unpacked into a scratch directory that lives as long as the
//! returned [`SourceTree`].

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An unpacked source archive.
///
/// The scratch directory is deleted when this is dropped, so keep it alive
/// for the whole build.
#[derive(Debug)]
pub struct SourceTree {
    _scratch: TempDir,
    root: PathBuf,
}

impl SourceTree {
    /// Root of the unpacked sources.
    ///
    /// Registry tarballs wrap everything in `package/` and code-host archives
    /// in `{repo}-{branch}/`; a single top-level directory is entered
    /// automatically so callers always see the real project root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Download the archive at `url` and unpack it into a scratch directory.
pub async fn fetch_archive(http: &reqwest::Client, url: &str) -> Result<SourceTree> {
    tracing::debug!(url, "downloading source archive");
    let response = http
        .get(url)
        .send()
        .await
        .or_raise(|| ErrorKind::Download(url.to_string()))?
        .error_for_status()
        .or_raise(|| ErrorKind::Download(url.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .or_raise(|| ErrorKind::Download(url.to_string()))?;
    // Unpacking is CPU + blocking filesystem work.
    tokio::task::spawn_blocking(move || -> Result<SourceTree> {
        let scratch = TempDir::new().or_raise(|| ErrorKind::Archive)?;
        unpack_targz(&bytes, scratch.path())?;
        let root = locate_root(scratch.path())?;
        Ok(SourceTree { _scratch: scratch, root })
    })
    .await
    .or_raise(|| ErrorKind::Archive)?
}

/// Unpack a gzipped tarball into `dest`.
pub(crate) fn unpack_targz(bytes: &[u8], dest: &Path) -> Result<()> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).or_raise(|| ErrorKind::Archive)
}

/// Enter a single wrapping top-level directory, if there is one.
pub(crate) fn locate_root(dir: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .or_raise(|| ErrorKind::Archive)?
        .collect::<std::io::Result<Vec<_>>>()
        .or_raise(|| ErrorKind::Archive)?;
    match entries.as_slice() {
        [single] if single.path().is_dir() => Ok(single.path()),
        _ => Ok(dir.to_path_buf()),
    }
}
