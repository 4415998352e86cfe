//! Directory scanning for eligible log files.
//!
//! Files are ordered by modification time, ties broken by name, so that
//! discovery is deterministic on filesystems with coarse timestamps.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::identity::{FileAttrs, FileIdentity};
use super::ignore::IgnoreFilter;

/// A file found in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
    pub size: u64,
    pub identity: FileIdentity,
}

impl Candidate {
    /// Build a candidate from a path and its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform reports no modification time.
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            identity: FileIdentity::of(metadata),
            size: metadata.len(),
            modified: metadata.modified()?,
            path,
            name,
        })
    }

    #[must_use]
    pub fn attrs(&self) -> FileAttrs<'_> {
        FileAttrs {
            name: &self.name,
            identity: self.identity,
            len: self.size,
        }
    }
}

/// List every eligible regular file in `dir`.
///
/// Entries that disappear between listing and stat are skipped.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn scan(dir: &Path, filter: &IgnoreFilter) -> io::Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !filter.is_eligible(name) {
            continue;
        }
        let path = entry.path();
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if let Ok(candidate) = Candidate::from_metadata(path, &metadata) {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

fn order_key(c: &Candidate) -> (SystemTime, &str) {
    (c.modified, c.name.as_str())
}

/// Find the eligible file with the earliest modification time.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn oldest(dir: &Path, filter: &IgnoreFilter) -> io::Result<Option<Candidate>> {
    Ok(scan(dir, filter)?
        .into_iter()
        .min_by(|a, b| order_key(a).cmp(&order_key(b))))
}

/// Find the eligible file with the latest modification time.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn newest(dir: &Path, filter: &IgnoreFilter) -> io::Result<Option<Candidate>> {
    Ok(scan(dir, filter)?
        .into_iter()
        .max_by(|a, b| order_key(a).cmp(&order_key(b))))
}

/// Find the oldest eligible file modified strictly after `after`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn next_after(
    dir: &Path,
    filter: &IgnoreFilter,
    after: SystemTime,
) -> io::Result<Option<Candidate>> {
    Ok(scan(dir, filter)?
        .into_iter()
        .filter(|c| c.modified > after)
        .min_by(|a, b| order_key(a).cmp(&order_key(b))))
}
