//! Sequential directory tailer.
//!
//! Reads the files of one directory in modification-time order as a single
//! byte stream. At end of file the tailer looks for the chronologically next
//! eligible file and switches to it without reporting EOF, recording the
//! finished file in the checkpoint's done-file log.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ReaderConfig;

use super::backoff::{RetryAbort, RetryPolicy, StopSignal};
use super::checkpoint::Checkpoint;
use super::discovery::{self, Candidate};
use super::error::ReaderError;
use super::identity::{classify, FileAttrs, FileIdentity};
use super::ignore::IgnoreFilter;

/// Where to start when no checkpoint exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whence {
    /// Earliest modified file, from its first byte.
    #[default]
    Oldest,
    /// Latest modified file, from its current end.
    Newest,
}

impl FromStr for Whence {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            other => Err(ReaderError::UnsupportedWhence(other.to_string())),
        }
    }
}

/// Tuning for a [`FileTailer`].
#[derive(Debug, Clone)]
pub struct TailerOptions {
    pub whence: Whence,
    pub filter: IgnoreFilter,
    /// Waits between attempts to open a file when none is open.
    pub reopen: RetryPolicy,
    /// Bounded waits while the current file and every successor are missing.
    pub vanished: RetryPolicy,
    /// Waits between done-file append attempts. Never bounded in practice.
    pub done_file: RetryPolicy,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            whence: Whence::Oldest,
            filter: IgnoreFilter::default(),
            reopen: RetryPolicy::unbounded(Duration::from_secs(3)),
            vanished: RetryPolicy::bounded(Duration::from_millis(100), 3),
            done_file: RetryPolicy::unbounded(Duration::from_secs(3)),
        }
    }
}

impl TailerOptions {
    /// Build options from the `[reader]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::InvalidPattern` if the file pattern is not a
    /// valid glob.
    pub fn from_config(config: &ReaderConfig) -> Result<Self, ReaderError> {
        Ok(Self {
            whence: config.whence,
            filter: IgnoreFilter::new(
                config.ignore_hidden,
                config.ignore_file_suffix.clone(),
                &config.valid_file_pattern,
            )?,
            reopen: RetryPolicy::unbounded(Duration::from_millis(config.reopen_delay_ms)),
            vanished: RetryPolicy::bounded(
                Duration::from_millis(config.vanished_delay_ms),
                config.vanished_retries,
            ),
            done_file: RetryPolicy::unbounded(Duration::from_millis(config.done_file_retry_ms)),
        })
    }
}

/// Position of the tailer inside its directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCursor {
    pub path: Option<PathBuf>,
    pub identity: FileIdentity,
    pub offset: u64,
}

enum Start {
    Offset(u64),
    End,
}

enum Discovery {
    /// Switch to this file.
    Switch(Candidate),
    /// Nothing new; keep the current file.
    Stay,
    /// The current file is gone and the directory offers nothing.
    Missing,
}

/// Reads every eligible file of a directory in chronological order.
#[derive(Debug)]
pub struct FileTailer<C: Checkpoint> {
    dir: PathBuf,
    options: TailerOptions,
    checkpoint: C,
    cursor: FileCursor,
    file: Option<File>,
    stop: StopSignal,
    last_sync: Option<(PathBuf, u64)>,
}

impl<C: Checkpoint> FileTailer<C> {
    /// Open a tailer over `dir`, restoring from `checkpoint` when possible.
    ///
    /// An empty directory is not an error: the first read retries discovery.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `dir` cannot be resolved or is not a
    /// directory, and an I/O error if the start file cannot be opened.
    pub fn open(
        dir: impl AsRef<Path>,
        options: TailerOptions,
        checkpoint: C,
    ) -> Result<Self, ReaderError> {
        let raw = dir.as_ref();
        let dir = fs::canonicalize(raw).map_err(|source| ReaderError::InvalidDirectory {
            path: raw.to_path_buf(),
            source,
        })?;
        if !dir.is_dir() {
            return Err(ReaderError::NotADirectory(dir));
        }

        let mut tailer = Self {
            dir,
            options,
            checkpoint,
            cursor: FileCursor::default(),
            file: None,
            stop: StopSignal::new(),
            last_sync: None,
        };
        tailer.restore_start()?;
        Ok(tailer)
    }

    fn restore_start(&mut self) -> Result<(), ReaderError> {
        let restored = match self.checkpoint.read_offset() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot read checkpoint, starting fresh");
                None
            }
        };

        let from_checkpoint = restored.is_some();
        let (path, start) = if let Some((path, offset)) = restored {
            tracing::debug!(dir = %self.dir.display(), path = %path.display(), offset, "Restored checkpoint");
            (path, Start::Offset(offset))
        } else {
            let found = match self.options.whence {
                Whence::Oldest => discovery::oldest(&self.dir, &self.options.filter)?,
                Whence::Newest => discovery::newest(&self.dir, &self.options.filter)?,
            };
            let Some(candidate) = found else {
                tracing::info!(dir = %self.dir.display(), "No eligible file yet");
                return Ok(());
            };
            let start = match self.options.whence {
                Whence::Oldest => Start::Offset(0),
                Whence::Newest => Start::End,
            };
            (candidate.path, start)
        };

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Start file vanished, will rescan on read");
                self.cursor.path = Some(path);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata()?;
        let offset = match start {
            Start::End => metadata.len(),
            Start::Offset(offset) if offset > metadata.len() => {
                tracing::warn!(
                    path = %path.display(),
                    offset,
                    len = metadata.len(),
                    "File shorter than checkpoint, restarting from 0"
                );
                0
            }
            Start::Offset(offset) => {
                if from_checkpoint {
                    self.last_sync = Some((path.clone(), offset));
                }
                offset
            }
        };
        file.seek(SeekFrom::Start(offset))?;

        self.cursor = FileCursor {
            path: Some(path),
            identity: FileIdentity::of(&metadata),
            offset,
        };
        self.file = Some(file);
        Ok(())
    }

    /// Resolved directory being tailed.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.cursor.offset
    }

    #[must_use]
    pub fn current_file(&self) -> Option<&Path> {
        self.cursor.path.as_deref()
    }

    #[must_use]
    pub fn checkpoint(&self) -> &C {
        &self.checkpoint
    }

    /// Handle for closing the tailer from another thread.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Stop the tailer and release the open file.
    pub fn close(&mut self) {
        self.stop.stop();
        self.file = None;
    }

    /// Persist the cursor if it moved since the last successful sync.
    ///
    /// # Errors
    ///
    /// Returns the checkpoint error; the next call retries the write.
    pub fn sync_meta(&mut self) -> Result<(), ReaderError> {
        let Some(path) = self.cursor.path.as_ref() else {
            return Ok(());
        };
        let offset = self.cursor.offset;
        if self
            .last_sync
            .as_ref()
            .is_some_and(|(p, o)| p == path && *o == offset)
        {
            tracing::trace!(path = %path.display(), offset, "Checkpoint unchanged, skipping");
            return Ok(());
        }
        self.checkpoint.write_offset(path, offset)?;
        self.last_sync = Some((path.clone(), offset));
        Ok(())
    }

    /// Fill `buf` with bytes from the current file and its successors.
    ///
    /// Every returned chunk comes from a single file: a short read at the end
    /// of a file is handed back first, and switching to the successor happens
    /// on the following call. Returns `Ok(0)` when no new data is available
    /// right now; the caller may read again later.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Closed` once the tailer is stopped, and
    /// propagates non-EOF I/O errors.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, ReaderError> {
        let mut n = 0;
        let mut reopen_retries = 0;
        let mut vanished_retries = 0;

        while n < buf.len() {
            if self.stop.is_stopped() {
                self.file = None;
                if n > 0 {
                    return Ok(n);
                }
                return Err(ReaderError::Closed(self.dir.clone()));
            }

            let Some(file) = self.file.as_mut() else {
                if n > 0 {
                    return Ok(n);
                }
                if let Err(e) = self.open_next() {
                    if !self.options.reopen.allows(reopen_retries) {
                        return Ok(0);
                    }
                    tracing::warn!(
                        dir = %self.dir.display(),
                        error = %e,
                        delay_ms = self.options.reopen.delay.as_millis(),
                        "Cannot open next file, retrying"
                    );
                    reopen_retries += 1;
                    self.stop.sleep(self.options.reopen.delay);
                }
                continue;
            };

            let read = match file.read(&mut buf[n..]) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if n > 0 => {
                    tracing::debug!(error = %e, "Read error after partial fill, deferring");
                    return Ok(n);
                }
                Err(e) => return Err(e.into()),
            };
            if read > 0 {
                self.cursor.offset += read as u64;
                n += read;
                continue;
            }
            if n > 0 {
                // One call never spans two files; discovery runs with an empty buffer.
                return Ok(n);
            }

            match self.discover()? {
                Discovery::Switch(candidate) => {
                    if !self.switch_to(candidate)? {
                        return Ok(n);
                    }
                }
                Discovery::Stay => return Ok(n),
                Discovery::Missing => {
                    if !self.options.vanished.allows(vanished_retries) {
                        tracing::warn!(
                            dir = %self.dir.display(),
                            retries = vanished_retries,
                            "Current file gone and no successor, abandoning cursor"
                        );
                        self.file = None;
                        return Ok(n);
                    }
                    vanished_retries += 1;
                    self.stop.sleep(self.options.vanished.delay);
                }
            }
        }
        Ok(n)
    }

    /// Decide whether a different file should be read next.
    fn discover(&self) -> Result<Discovery, ReaderError> {
        let current_meta = match &self.cursor.path {
            None => None,
            Some(path) => match fs::metadata(path) {
                Ok(metadata) => Some((path.clone(), metadata)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "Current file vanished, rescanning directory");
                    None
                }
                Err(e) => return Err(e.into()),
            },
        };

        let current_name = self
            .cursor
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let current = FileAttrs {
            name: &current_name,
            identity: self.cursor.identity,
            len: self.cursor.offset,
        };

        let found = if let Some((path, metadata)) = current_meta {
            // The current name may now point at a replaced or truncated file.
            let same_path = Candidate::from_metadata(path, &metadata)?;
            let rotation = classify(current, same_path.attrs());
            if rotation.is_new_file() {
                tracing::debug!(path = %same_path.path.display(), ?rotation, "Current path rotated");
                return Ok(Discovery::Switch(same_path));
            }
            match discovery::next_after(&self.dir, &self.options.filter, same_path.modified) {
                Ok(Some(candidate)) => candidate,
                Ok(None) => return Ok(Discovery::Stay),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Discovery::Missing),
                Err(e) => return Err(e.into()),
            }
        } else {
            match discovery::oldest(&self.dir, &self.options.filter) {
                Ok(Some(candidate)) => candidate,
                Ok(None) => return Ok(Discovery::Missing),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Discovery::Missing),
                Err(e) => return Err(e.into()),
            }
        };

        let rotation = classify(current, found.attrs());
        if rotation.is_new_file() {
            tracing::debug!(
                dir = %self.dir.display(),
                next = %found.name,
                ?rotation,
                "Found next file"
            );
            Ok(Discovery::Switch(found))
        } else {
            Ok(Discovery::Stay)
        }
    }

    /// Open the oldest eligible file when no handle is held. No done-file
    /// entry is written because nothing was finished.
    fn open_next(&mut self) -> Result<(), ReaderError> {
        let Some(candidate) = discovery::oldest(&self.dir, &self.options.filter)? else {
            return Err(ReaderError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no eligible file in {}", self.dir.display()),
            )));
        };
        let file = File::open(&candidate.path)?;
        let identity = FileIdentity::of(&file.metadata()?);
        tracing::info!(dir = %self.dir.display(), file = %candidate.name, "Start tailing file");
        self.cursor = FileCursor {
            path: Some(candidate.path),
            identity,
            offset: 0,
        };
        self.file = Some(file);
        Ok(())
    }

    /// Switch from the finished current file to `candidate`.
    ///
    /// Returns `false` if the candidate disappeared before it could be opened.
    fn switch_to(&mut self, candidate: Candidate) -> Result<bool, ReaderError> {
        let file = match File::open(&candidate.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %candidate.path.display(), "Next file vanished before open");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let identity = FileIdentity::of(&file.metadata()?);

        if let Some(done) = self.cursor.path.clone() {
            self.record_done_file(&done)?;
        }

        tracing::info!(dir = %self.dir.display(), file = %candidate.name, "Start tailing new file");
        self.file = Some(file);
        self.cursor = FileCursor {
            path: Some(candidate.path),
            identity,
            offset: 0,
        };
        Ok(true)
    }

    fn record_done_file(&mut self, done: &Path) -> Result<(), ReaderError> {
        let policy = self.options.done_file;
        let checkpoint = &mut self.checkpoint;
        let result = policy.run(&self.stop, || {
            checkpoint.append_done_file(done).inspect_err(|e| {
                tracing::error!(path = %done.display(), error = %e, "Cannot write done file");
            })
        });
        match result {
            Ok(()) => Ok(()),
            Err(RetryAbort::Stopped) => Err(ReaderError::Closed(self.dir.clone())),
            Err(RetryAbort::Exhausted(e)) => Err(e.into()),
        }
    }
}

impl<C: Checkpoint> Read for FileTailer<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::discovery::test_support::{set_mtime, write_file_at};
    use crate::reader::error::CheckpointError;
    use std::io::Write;
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct MemoryCheckpoint {
        state: Option<(PathBuf, u64)>,
        writes: Vec<(PathBuf, u64)>,
        done: Vec<PathBuf>,
        fail_appends: u32,
        fail_writes: u32,
    }

    fn injected() -> CheckpointError {
        CheckpointError::Io(io::Error::other("injected failure"))
    }

    impl Checkpoint for MemoryCheckpoint {
        fn read_offset(&self) -> Result<Option<(PathBuf, u64)>, CheckpointError> {
            Ok(self.state.clone())
        }

        fn write_offset(&mut self, path: &Path, offset: u64) -> Result<(), CheckpointError> {
            if self.fail_writes > 0 {
                self.fail_writes -= 1;
                return Err(injected());
            }
            self.state = Some((path.to_path_buf(), offset));
            self.writes.push((path.to_path_buf(), offset));
            Ok(())
        }

        fn append_done_file(&mut self, path: &Path) -> Result<(), CheckpointError> {
            if self.fail_appends > 0 {
                self.fail_appends -= 1;
                return Err(injected());
            }
            self.done.push(path.to_path_buf());
            Ok(())
        }
    }

    fn fast_options(whence: Whence) -> TailerOptions {
        TailerOptions {
            whence,
            filter: IgnoreFilter::default(),
            reopen: RetryPolicy::unbounded(Duration::from_millis(5)),
            vanished: RetryPolicy::bounded(Duration::from_millis(1), 3),
            done_file: RetryPolicy::unbounded(Duration::from_millis(1)),
        }
    }

    fn drain<C: Checkpoint>(tailer: &mut FileTailer<C>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = tailer.read_bytes(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn three_files(dir: &TempDir) {
        write_file_at(dir.path(), "b.log", b"second\n", 20);
        write_file_at(dir.path(), "a.log", b"first\n", 10);
        write_file_at(dir.path(), "c.log", b"third\n", 30);
    }

    #[test]
    fn test_whence_from_str() {
        assert_eq!("oldest".parse::<Whence>().unwrap(), Whence::Oldest);
        assert_eq!("newest".parse::<Whence>().unwrap(), Whence::Newest);
        assert!(matches!(
            "middle".parse::<Whence>(),
            Err(ReaderError::UnsupportedWhence(_))
        ));
    }

    #[test]
    fn test_options_from_config() {
        let config = ReaderConfig {
            whence: Whence::Newest,
            vanished_retries: 5,
            ignore_file_suffix: vec![".gz".into()],
            ..ReaderConfig::default()
        };
        let options = TailerOptions::from_config(&config).unwrap();
        assert_eq!(options.whence, Whence::Newest);
        assert_eq!(options.vanished.max_retries, Some(5));
        assert_eq!(options.reopen.max_retries, None);
        assert!(!options.filter.is_eligible("old.log.gz"));

        let bad = ReaderConfig {
            valid_file_pattern: "[".into(),
            ..ReaderConfig::default()
        };
        assert!(matches!(
            TailerOptions::from_config(&bad),
            Err(ReaderError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let result = FileTailer::open(
            "/nonexistent/logship-tailer",
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        );
        assert!(matches!(result, Err(ReaderError::InvalidDirectory { .. })));
    }

    #[test]
    fn test_open_file_path_fails() {
        let dir = TempDir::new().unwrap();
        let file = write_file_at(dir.path(), "a.log", b"x", 1);
        let result = FileTailer::open(
            file,
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        );
        assert!(matches!(result, Err(ReaderError::NotADirectory(_))));
    }

    #[test]
    fn test_oldest_reads_all_files_in_order() {
        let dir = TempDir::new().unwrap();
        three_files(&dir);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert_eq!(tailer.offset(), 0);
        assert!(tailer.current_file().unwrap().ends_with("a.log"));

        let data = drain(&mut tailer);
        assert_eq!(data, b"first\nsecond\nthird\n");
        assert!(tailer.current_file().unwrap().ends_with("c.log"));
        assert_eq!(tailer.offset(), 6);
        assert_eq!(names(&tailer.checkpoint().done), vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_newest_starts_at_end() {
        let dir = TempDir::new().unwrap();
        three_files(&dir);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Newest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert!(tailer.current_file().unwrap().ends_with("c.log"));
        assert_eq!(tailer.offset(), 6);
        assert!(drain(&mut tailer).is_empty());
    }

    #[test]
    fn test_resume_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        three_files(&dir);
        let resolved = std::fs::canonicalize(dir.path()).unwrap();
        let checkpoint = MemoryCheckpoint {
            state: Some((resolved.join("b.log"), 3)),
            ..Default::default()
        };
        let mut tailer =
            FileTailer::open(dir.path(), fast_options(Whence::Oldest), checkpoint).unwrap();
        assert_eq!(tailer.offset(), 3);
        assert_eq!(drain(&mut tailer), b"ond\nthird\n");
    }

    #[test]
    fn test_checkpoint_beyond_file_size_resets() {
        let dir = TempDir::new().unwrap();
        let path = write_file_at(dir.path(), "a.log", b"short\n", 10);
        let checkpoint = MemoryCheckpoint {
            state: Some((path, 4096)),
            ..Default::default()
        };
        let mut tailer =
            FileTailer::open(dir.path(), fast_options(Whence::Oldest), checkpoint).unwrap();
        assert_eq!(tailer.offset(), 0);
        assert_eq!(drain(&mut tailer), b"short\n");
    }

    #[test]
    fn test_empty_directory_then_file_appears() {
        let dir = TempDir::new().unwrap();
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert!(tailer.current_file().is_none());

        write_file_at(dir.path(), "late.log", b"hello\n", 5);
        assert_eq!(drain(&mut tailer), b"hello\n");
        assert!(tailer.checkpoint().done.is_empty());
    }

    #[test]
    fn test_eof_without_successor_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_file_at(dir.path(), "a.log", b"one\n", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert_eq!(drain(&mut tailer), b"one\n");

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"two\n").unwrap();
        set_mtime(&path, 11);
        assert_eq!(drain(&mut tailer), b"two\n");
        assert_eq!(tailer.offset(), 8);
    }

    #[test]
    fn test_replaced_with_smaller_file_restarts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = write_file_at(dir.path(), "app.log", b"0123456789\n", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert_eq!(drain(&mut tailer).len(), 11);

        std::fs::remove_file(&path).unwrap();
        write_file_at(dir.path(), "app.log", b"new\n", 20);

        assert_eq!(drain(&mut tailer), b"new\n");
        assert_eq!(tailer.offset(), 4);
        assert_eq!(names(&tailer.checkpoint().done), vec!["app.log"]);
    }

    #[test]
    fn test_truncated_in_place_restarts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = write_file_at(dir.path(), "app.log", b"0123456789\n", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert_eq!(drain(&mut tailer).len(), 11);

        std::fs::write(&path, b"ab\n").unwrap();
        assert_eq!(drain(&mut tailer), b"ab\n");
        assert_eq!(tailer.offset(), 3);
    }

    #[test]
    fn test_vanished_file_switches_to_remaining_file() {
        let dir = TempDir::new().unwrap();
        let first = write_file_at(dir.path(), "a.log", b"aaa\n", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert_eq!(drain(&mut tailer), b"aaa\n");

        write_file_at(dir.path(), "b.log", b"bbb\n", 5);
        std::fs::remove_file(&first).unwrap();

        assert_eq!(drain(&mut tailer), b"bbb\n");
        assert_eq!(names(&tailer.checkpoint().done), vec!["a.log"]);
    }

    #[test]
    fn test_vanished_without_successor_returns_eof_then_recovers() {
        let dir = TempDir::new().unwrap();
        let first = write_file_at(dir.path(), "a.log", b"aaa\n", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        assert_eq!(drain(&mut tailer), b"aaa\n");

        std::fs::remove_file(&first).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 0);

        write_file_at(dir.path(), "b.log", b"bbb\n", 20);
        assert_eq!(drain(&mut tailer), b"bbb\n");
        assert!(tailer.checkpoint().done.is_empty());
    }

    #[test]
    fn test_vanished_bound_follows_options() {
        let dir = TempDir::new().unwrap();
        let first = write_file_at(dir.path(), "a.log", b"aaa\n", 10);
        let mut options = fast_options(Whence::Oldest);
        options.vanished = RetryPolicy::bounded(Duration::from_millis(20), 5);
        let mut tailer =
            FileTailer::open(dir.path(), options, MemoryCheckpoint::default()).unwrap();
        assert_eq!(drain(&mut tailer), b"aaa\n");
        std::fs::remove_file(&first).unwrap();

        let start = Instant::now();
        let mut buf = [0u8; 16];
        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 0);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[test]
    fn test_zero_vanished_bound_gives_up_without_waiting() {
        let dir = TempDir::new().unwrap();
        let first = write_file_at(dir.path(), "a.log", b"aaa\n", 10);
        let mut options = fast_options(Whence::Oldest);
        options.vanished = RetryPolicy::bounded(Duration::from_secs(30), 0);
        let mut tailer =
            FileTailer::open(dir.path(), options, MemoryCheckpoint::default()).unwrap();
        assert_eq!(drain(&mut tailer), b"aaa\n");
        std::fs::remove_file(&first).unwrap();

        let start = Instant::now();
        let mut buf = [0u8; 16];
        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_chunks_never_span_files() {
        let dir = TempDir::new().unwrap();
        three_files(&dir);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"first\n");
        assert!(tailer.current_file().unwrap().ends_with("a.log"));
        assert!(tailer.checkpoint().done.is_empty());

        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 7);
        assert_eq!(&buf[..7], b"second\n");
        assert!(tailer.current_file().unwrap().ends_with("b.log"));
        assert_eq!(names(&tailer.checkpoint().done), vec!["a.log"]);
    }

    #[test]
    fn test_blocked_switch_keeps_delivered_bytes_and_offset() {
        let dir = TempDir::new().unwrap();
        write_file_at(dir.path(), "a.log", b"first\n", 10);
        write_file_at(dir.path(), "b.log", b"second\n", 20);
        let checkpoint = MemoryCheckpoint {
            fail_appends: u32::MAX,
            ..Default::default()
        };
        let mut tailer =
            FileTailer::open(dir.path(), fast_options(Whence::Oldest), checkpoint).unwrap();
        let stop = tailer.stop_signal();
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            stop.stop();
        });

        let mut buf = [0u8; 64];
        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"first\n");
        assert_eq!(tailer.offset(), 6);

        // The done-file append never succeeds, so only the stop ends the wait.
        assert!(matches!(
            tailer.read_bytes(&mut buf),
            Err(ReaderError::Closed(_))
        ));
        closer.join().unwrap();
        assert!(tailer.current_file().unwrap().ends_with("a.log"));
        assert_eq!(tailer.offset(), 6);

        tailer.sync_meta().unwrap();
        let (path, offset) = tailer.checkpoint().writes.last().unwrap();
        assert!(path.ends_with("a.log"));
        assert_eq!(*offset, 6);
        assert!(tailer.checkpoint().done.is_empty());
    }

    #[test]
    fn test_done_file_survives_transient_failures() {
        let dir = TempDir::new().unwrap();
        three_files(&dir);
        let checkpoint = MemoryCheckpoint {
            fail_appends: 3,
            ..Default::default()
        };
        let mut tailer =
            FileTailer::open(dir.path(), fast_options(Whence::Oldest), checkpoint).unwrap();

        assert_eq!(drain(&mut tailer), b"first\nsecond\nthird\n");
        assert_eq!(names(&tailer.checkpoint().done), vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_sync_meta_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_file_at(dir.path(), "a.log", b"abcdef", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 3);
        tailer.sync_meta().unwrap();
        tailer.sync_meta().unwrap();
        assert_eq!(tailer.checkpoint().writes.len(), 1);
        assert_eq!(tailer.checkpoint().writes[0].1, 3);

        assert_eq!(tailer.read_bytes(&mut buf).unwrap(), 3);
        tailer.sync_meta().unwrap();
        assert_eq!(tailer.checkpoint().writes.len(), 2);
        assert_eq!(tailer.checkpoint().writes[1].1, 6);
    }

    #[test]
    fn test_sync_meta_failure_is_surfaced_and_retried() {
        let dir = TempDir::new().unwrap();
        write_file_at(dir.path(), "a.log", b"abc", 10);
        let checkpoint = MemoryCheckpoint {
            fail_writes: 1,
            ..Default::default()
        };
        let mut tailer =
            FileTailer::open(dir.path(), fast_options(Whence::Oldest), checkpoint).unwrap();
        drain(&mut tailer);

        assert!(matches!(
            tailer.sync_meta(),
            Err(ReaderError::Checkpoint(_))
        ));
        tailer.sync_meta().unwrap();
        assert_eq!(tailer.checkpoint().writes.len(), 1);
    }

    #[test]
    fn test_sync_meta_without_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        tailer.sync_meta().unwrap();
        assert!(tailer.checkpoint().writes.is_empty());
    }

    #[test]
    fn test_read_after_close_fails() {
        let dir = TempDir::new().unwrap();
        write_file_at(dir.path(), "a.log", b"abc", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        tailer.close();
        let mut buf = [0u8; 8];
        assert!(matches!(
            tailer.read_bytes(&mut buf),
            Err(ReaderError::Closed(_))
        ));
    }

    #[test]
    fn test_concurrent_close_interrupts_waiting_read() {
        let dir = TempDir::new().unwrap();
        let mut options = fast_options(Whence::Oldest);
        options.reopen = RetryPolicy::unbounded(Duration::from_secs(30));
        let mut tailer =
            FileTailer::open(dir.path(), options, MemoryCheckpoint::default()).unwrap();
        let stop = tailer.stop_signal();
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            stop.stop();
        });

        let start = Instant::now();
        let mut buf = [0u8; 8];
        let result = tailer.read_bytes(&mut buf);
        assert!(matches!(result, Err(ReaderError::Closed(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
        closer.join().unwrap();
    }

    #[test]
    fn test_io_read_impl() {
        let dir = TempDir::new().unwrap();
        write_file_at(dir.path(), "a.log", b"line one\nline two\n", 10);
        let mut tailer = FileTailer::open(
            dir.path(),
            fast_options(Whence::Oldest),
            MemoryCheckpoint::default(),
        )
        .unwrap();
        let mut text = String::new();
        tailer.read_to_string(&mut text).unwrap();
        assert_eq!(text, "line one\nline two\n");
    }
}
