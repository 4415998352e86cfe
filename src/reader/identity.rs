//! File identity and rotation classification.
//!
//! Identity is the inode number on Unix. Platforms without a stable
//! identity report `FileIdentity::UNKNOWN`, and rotation detection falls
//! back to size and name signals.

use std::fs::Metadata;

/// Platform identity of a file, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileIdentity(Option<u64>);

impl FileIdentity {
    /// Identity for files whose platform offers none.
    pub const UNKNOWN: Self = Self(None);

    /// Build an identity from a raw inode number. Zero means unknown.
    #[must_use]
    pub fn from_inode(ino: u64) -> Self {
        if ino == 0 {
            Self::UNKNOWN
        } else {
            Self(Some(ino))
        }
    }

    /// Read the identity from file metadata.
    #[cfg(unix)]
    #[must_use]
    pub fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self::from_inode(metadata.ino())
    }

    /// Read the identity from file metadata.
    #[cfg(not(unix))]
    #[must_use]
    pub fn of(_metadata: &Metadata) -> Self {
        Self::UNKNOWN
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }

    #[must_use]
    pub fn inode(&self) -> Option<u64> {
        self.0
    }
}

/// The attributes rotation detection compares.
#[derive(Debug, Clone, Copy)]
pub struct FileAttrs<'a> {
    pub name: &'a str,
    pub identity: FileIdentity,
    /// Read offset for the current file, size for a candidate.
    pub len: u64,
}

/// Outcome of comparing a discovered candidate with the current cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Same file; no switch.
    Same,
    /// Different identity.
    Rotated,
    /// Candidate is smaller than what was already read.
    Truncated,
    /// Identity unavailable and the name differs.
    Renamed,
}

impl Rotation {
    /// Whether the tailer should switch to the candidate.
    #[must_use]
    pub fn is_new_file(self) -> bool {
        !matches!(self, Self::Same)
    }
}

/// Classify a candidate against the current file.
///
/// Known and equal identities with a different name mean the current file
/// was renamed away; that is the same file and must not be re-read.
#[must_use]
pub fn classify(current: FileAttrs<'_>, candidate: FileAttrs<'_>) -> Rotation {
    let both_known = current.identity.is_known() && candidate.identity.is_known();
    if both_known && current.identity != candidate.identity {
        return Rotation::Rotated;
    }
    if candidate.len < current.len {
        return Rotation::Truncated;
    }
    if !both_known && candidate.name != current.name {
        return Rotation::Renamed;
    }
    Rotation::Same
}
