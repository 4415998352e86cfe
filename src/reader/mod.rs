//! Directory tailing reader.
//!
//! Presents the log files of one directory as a single continuous byte
//! stream, following rotation and persisting its position through a
//! [`Checkpoint`] collaborator.

mod backoff;
mod checkpoint;
mod discovery;
mod error;
mod identity;
mod ignore;
mod tailer;

pub use backoff::{RetryAbort, RetryPolicy, StopSignal};
pub use checkpoint::{Checkpoint, FileCheckpoint};
pub use discovery::Candidate;
pub use error::{CheckpointError, ReaderError};
pub use identity::{classify, FileAttrs, FileIdentity, Rotation};
pub use ignore::IgnoreFilter;
pub use tailer::{FileCursor, FileTailer, TailerOptions, Whence};
