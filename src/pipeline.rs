//! Shipping loop between a [`FileTailer`] and a [`Sender`].
//!
//! A dedicated thread owns the tailer, splits its byte stream into lines and
//! parses each line as a JSON object. Parsed records are handed to the async
//! side, which delivers them and resends whatever the endpoint did not
//! accept. The checkpoint only advances after delivery, and only when no
//! partial line is buffered. An unterminated last line of a finished file is
//! shipped on its own once the tailer moves to the next file.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::reader::{Checkpoint, FileTailer, ReaderError};
use crate::sender::{Record, Sender};

/// Errors that end the shipping loop.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Cannot start reader thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Reader thread panicked")]
    ReaderPanicked,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub records_delivered: u64,
}

/// Splits a byte stream into lines, carrying partial lines across chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completes, without the
    /// trailing `\n` or `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Take the buffered unterminated line, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        let line = pending.strip_suffix(b"\r").unwrap_or(&pending);
        Some(String::from_utf8_lossy(line).into_owned())
    }

    /// Whether bytes of an unterminated line are buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Parse one line as a record. Blank lines and non-objects yield `None`.
#[must_use]
pub fn parse_record(line: &str) -> Option<Record> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Object(record)) => Some(record),
        Ok(_) => {
            tracing::warn!(line, "Skipping line that is not a JSON object");
            None
        }
        Err(e) => {
            tracing::warn!(line, error = %e, "Skipping unparseable line");
            None
        }
    }
}

struct ReadBatch {
    records: Vec<Record>,
    delivered: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct ReaderStats {
    lines_read: u64,
    lines_skipped: u64,
}

/// Run until `cancel` fires or the tailer is closed.
///
/// # Errors
///
/// Returns an error if the reader thread cannot be started or panics.
pub async fn run<C>(
    tailer: FileTailer<C>,
    sender: Sender,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<PipelineStats, PipelineError>
where
    C: Checkpoint + 'static,
{
    let cancel = cancel.child_token();
    let (batch_tx, mut batch_rx) = mpsc::channel::<ReadBatch>(1);

    let stop = tailer.stop_signal();
    let stop_on_cancel = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            stop.stop();
        })
    };

    let settings = ReaderSettings {
        buffer_bytes: config.read_buffer_bytes.max(1),
        idle: Duration::from_millis(config.idle_poll_ms),
        max_records: config.max_records_per_send.max(1),
    };
    let reader = thread::Builder::new()
        .name("logship-reader".to_string())
        .spawn(move || read_loop(tailer, &batch_tx, &settings))
        .map_err(PipelineError::Spawn)?;

    let resend_delay = Duration::from_millis(config.resend_delay_ms);
    let mut records_delivered = 0u64;
    while let Some(batch) = batch_rx.recv().await {
        let count = batch.records.len() as u64;
        if !deliver(&sender, batch.records, resend_delay, &cancel).await {
            break;
        }
        records_delivered += count;
        // The reader may already be gone on shutdown.
        let _ = batch.delivered.send(());
    }
    drop(batch_rx);

    // Unblock the reader if the loop ended for another reason.
    cancel.cancel();
    let joined = tokio::task::spawn_blocking(move || reader.join()).await;
    stop_on_cancel.abort();

    let reader_stats = match joined {
        Ok(Ok(stats)) => stats,
        _ => return Err(PipelineError::ReaderPanicked),
    };
    let stats = PipelineStats {
        lines_read: reader_stats.lines_read,
        lines_skipped: reader_stats.lines_skipped,
        records_delivered,
    };
    tracing::info!(?stats, "Pipeline stopped");
    Ok(stats)
}

/// Send until every record is accepted. Returns `false` if cancelled first.
async fn deliver(
    sender: &Sender,
    records: Vec<Record>,
    resend_delay: Duration,
    cancel: &CancellationToken,
) -> bool {
    let mut pending = records;
    loop {
        match sender.send(pending).await {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!(error = %e, "Delivery incomplete, resending failed records");
                pending = e.into_failed();
                if pending.is_empty() {
                    return true;
                }
            }
        }
        tokio::select! {
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(resend_delay) => {}
        }
    }
}

struct ReaderSettings {
    buffer_bytes: usize,
    idle: Duration,
    max_records: usize,
}

fn read_loop<C: Checkpoint>(
    mut tailer: FileTailer<C>,
    batch_tx: &mpsc::Sender<ReadBatch>,
    settings: &ReaderSettings,
) -> ReaderStats {
    let stop = tailer.stop_signal();
    let mut stats = ReaderStats::default();
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; settings.buffer_bytes];
    let mut source: Option<PathBuf> = tailer.current_file().map(Path::to_path_buf);

    loop {
        let before = tailer.offset();
        let n = match tailer.read_bytes(&mut buf) {
            Ok(0) => {
                stop.sleep(settings.idle);
                continue;
            }
            Ok(n) => n,
            Err(ReaderError::Closed(_)) => break,
            Err(e) => {
                tracing::warn!(dir = %tailer.dir().display(), error = %e, "Read failed");
                stop.sleep(settings.idle);
                continue;
            }
        };

        // Each chunk comes from one file; a fresh file restarts at offset 0.
        let mut lines = Vec::new();
        let switched = tailer.current_file() != source.as_deref()
            || tailer.offset() != before + n as u64;
        if switched {
            if let Some(tail) = splitter.flush() {
                tracing::debug!(file = ?source, "File ended without a newline, shipping last line");
                lines.push(tail);
            }
            source = tailer.current_file().map(Path::to_path_buf);
        }
        lines.extend(splitter.push(&buf[..n]));

        let mut records = Vec::new();
        for line in lines {
            stats.lines_read += 1;
            match parse_record(&line) {
                Some(record) => records.push(record),
                None => stats.lines_skipped += 1,
            }
        }

        for chunk in chunks(records, settings.max_records) {
            let (delivered_tx, delivered_rx) = oneshot::channel();
            let batch = ReadBatch {
                records: chunk,
                delivered: delivered_tx,
            };
            if batch_tx.blocking_send(batch).is_err() || delivered_rx.blocking_recv().is_err() {
                tracing::debug!("Delivery side closed, stopping reader");
                tailer.close();
                return stats;
            }
        }

        if !splitter.has_partial() {
            if let Err(e) = tailer.sync_meta() {
                tracing::warn!(error = %e, "Cannot write checkpoint");
            }
        }
    }

    tailer.close();
    stats
}

fn chunks(mut records: Vec<Record>, size: usize) -> Vec<Vec<Record>> {
    let mut out = Vec::new();
    while records.len() > size {
        let rest = records.split_off(size);
        out.push(std::mem::replace(&mut records, rest));
    }
    if !records.is_empty() {
        out.push(records);
    }
    out
}
