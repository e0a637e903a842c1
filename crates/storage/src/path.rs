//! Path validation and security utilities.
//!
//! Storage paths arrive assembled from addon names and branch names that we
//! do not control, so every path is validated before it touches a backend.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    // Use Rust's built-in path component parser for robust handling of
    // separators, `.` segments, and trailing slashes.
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls — reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a bucket name: a single plain path component, nothing else.
pub(crate) fn validate_bucket(bucket: &str) -> Result<&str> {
    let normalized = validate(bucket)?;
    if normalized != Path::new(bucket) || normalized.components().count() != 1 {
        exn::bail!(ErrorKind::InvalidBucket(bucket.to_string()));
    }
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("addon/release-1.2.3/docs.json")).unwrap(), Path::new("addon/release-1.2.3/docs.json"));
        assert_eq!(validate(Path::new("a/b/c/file.json")).unwrap(), Path::new("a/b/c/file.json"));
        assert_eq!(validate(Path::new("simple.json")).unwrap(), Path::new("simple.json"));
    }

    #[test]
    fn test_path_normalization() {
        // Double slashes are normalized
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        // Current directory references removed
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        // Trailing slashes stripped
        assert_eq!(validate(Path::new("addon/branch-master/")).unwrap(), Path::new("addon/branch-master"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
        // Traversal that remains within the root is resolved
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("\0")).is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }

    #[test]
    fn test_buckets() {
        assert!(validate_bucket("drydock-docs").is_ok());
        assert!(validate_bucket("").is_err());
        assert!(validate_bucket("nested/bucket").is_err());
        assert!(validate_bucket("..").is_err());
    }
}
