//! Checkpoint collaborator for the tailer.
//!
//! The tailer only depends on the [`Checkpoint`] trait. [`FileCheckpoint`]
//! is the on-disk store used by the binary: an atomically replaced
//! `offset.json` and an append-only `done_files` log.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::CheckpointError;

const OFFSET_FILE: &str = "offset.json";
const DONE_FILE_LOG: &str = "done_files";

/// Durable position store consumed by the tailer.
pub trait Checkpoint: Send {
    /// Restore the previous cursor, `None` when there is no prior state.
    ///
    /// # Errors
    ///
    /// Returns an error if stored state exists but cannot be read.
    fn read_offset(&self) -> Result<Option<(PathBuf, u64)>, CheckpointError>;

    /// Persist the current (file, offset) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair could not be made durable.
    fn write_offset(&mut self, path: &Path, offset: u64) -> Result<(), CheckpointError>;

    /// Append a fully consumed file to the done-file log.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be made durable.
    fn append_done_file(&mut self, path: &Path) -> Result<(), CheckpointError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct OffsetRecord {
    file: PathBuf,
    offset: u64,
}

/// Checkpoint store backed by a metadata directory.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    dir: PathBuf,
}

impl FileCheckpoint {
    /// Open (and create if needed) a checkpoint directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Default checkpoint directory for a named tailer.
    #[must_use]
    pub fn default_dir(name: &str) -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logship")
            .join(name)
    }

    /// Every path recorded in the done-file log, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    pub fn done_files(&self) -> Result<Vec<PathBuf>, CheckpointError> {
        let path = self.dir.join(DONE_FILE_LOG);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut done = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.is_empty() {
                done.push(PathBuf::from(line));
            }
        }
        Ok(done)
    }
}

impl Checkpoint for FileCheckpoint {
    fn read_offset(&self) -> Result<Option<(PathBuf, u64)>, CheckpointError> {
        let path = self.dir.join(OFFSET_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: OffsetRecord = serde_json::from_str(&content)?;
        Ok(Some((record.file, record.offset)))
    }

    fn write_offset(&mut self, path: &Path, offset: u64) -> Result<(), CheckpointError> {
        let target = self.dir.join(OFFSET_FILE);
        let temp = target.with_extension("tmp");
        let content = serde_json::to_vec(&OffsetRecord {
            file: path.to_path_buf(),
            offset,
        })?;
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)?;
        Ok(())
    }

    fn append_done_file(&mut self, path: &Path) -> Result<(), CheckpointError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(DONE_FILE_LOG))?;
        writeln!(file, "{}", path.display())?;
        file.sync_all()?;
        Ok(())
    }
}
