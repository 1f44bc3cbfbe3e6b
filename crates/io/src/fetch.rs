//! Source retrieval seam.
//!
//! Loaders never open files themselves; they ask a [`Fetch`] for bytes.
//! [`FsFetch`] reads from disk relative to a root directory. There is no
//! retry or backoff here: a failed fetch is reported once and the source is
//! skipped.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Why a resource could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub resource: String,
    pub reason: String,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot fetch '{}': {}", self.resource, self.reason)
    }
}

impl std::error::Error for FetchFailure {}

pub trait Fetch: Sync {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>, FetchFailure>;
}

/// Reads resources from the local filesystem. Relative resources are
/// resolved against `root`.
#[derive(Debug, Clone)]
pub struct FsFetch {
    root: PathBuf,
}

impl FsFetch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, resource: &str) -> PathBuf {
        let path = Path::new(resource);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Fetch for FsFetch {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>, FetchFailure> {
        let path = self.resolve(resource);
        std::fs::read(&path).map_err(|e| FetchFailure {
            resource: resource.to_string(),
            reason: e.to_string(),
        })
    }
}

/// In-memory resources keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetch {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.resources.insert(resource.into(), bytes.into());
    }
}

impl Fetch for MemoryFetch {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>, FetchFailure> {
        self.resources.get(resource).cloned().ok_or_else(|| FetchFailure {
            resource: resource.to_string(),
            reason: "no such resource".into(),
        })
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_fetch_resolves_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"x,y\n").unwrap();
        let fetch = FsFetch::new(dir.path());
        assert_eq!(fetch.fetch("a.csv").unwrap(), b"x,y\n");
    }

    #[test]
    fn fs_fetch_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsFetch::new(dir.path()).fetch("missing.xlsx").unwrap_err();
        assert_eq!(err.resource, "missing.xlsx");
        assert!(err.to_string().starts_with("cannot fetch 'missing.xlsx'"));
    }

    #[test]
    fn memory_fetch_round_trip() {
        let mut fetch = MemoryFetch::new();
        fetch.insert("k", b"v".to_vec());
        assert_eq!(fetch.fetch("k").unwrap(), b"v");
        assert!(fetch.fetch("other").is_err());
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
