//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::reader::{FileCheckpoint, Whence};
use crate::sender::{FieldPolicy, DEFAULT_MAX_BATCH_BYTES};

use super::ConfigError;

/// Top-level configuration of one shipping pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperConfig {
    /// Pipeline name, used to namespace checkpoint state.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_name() -> String {
    "default".to_string()
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            reader: ReaderConfig::default(),
            sender: SenderConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ShipperConfig {
    /// Checkpoint directory, explicit or derived from the pipeline name.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.reader
            .meta_path
            .clone()
            .unwrap_or_else(|| FileCheckpoint::default_dir(&self.name))
    }

    /// Reject values no pipeline can run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.sender.repo.trim().is_empty() {
            return Err(ConfigError::Invalid("sender.repo must not be empty".into()));
        }
        if self.sender.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("sender.endpoint must not be empty".into()));
        }
        if self.pipeline.read_buffer_bytes == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.read_buffer_bytes must be positive".into(),
            ));
        }
        if self.pipeline.max_records_per_send == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_records_per_send must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `[reader]` section: which directory to tail and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Directory whose files are read in modification-time order.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Checkpoint directory; defaults to the local data dir.
    #[serde(default)]
    pub meta_path: Option<PathBuf>,
    /// Start position when no checkpoint exists.
    #[serde(default)]
    pub whence: Whence,
    #[serde(default = "default_true")]
    pub ignore_hidden: bool,
    /// File name suffixes never read, e.g. `.gz`.
    #[serde(default)]
    pub ignore_file_suffix: Vec<String>,
    /// Glob that eligible file names must match.
    #[serde(default = "default_valid_file_pattern")]
    pub valid_file_pattern: String,
    #[serde(default = "default_reopen_delay_ms")]
    pub reopen_delay_ms: u64,
    #[serde(default = "default_vanished_delay_ms")]
    pub vanished_delay_ms: u64,
    /// Retries while the current file is gone and nothing replaces it.
    #[serde(default = "default_vanished_retries")]
    pub vanished_retries: u32,
    #[serde(default = "default_done_file_retry_ms")]
    pub done_file_retry_ms: u64,
}

fn default_log_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_valid_file_pattern() -> String {
    "*".to_string()
}

fn default_reopen_delay_ms() -> u64 {
    3000
}

fn default_vanished_delay_ms() -> u64 {
    100
}

fn default_vanished_retries() -> u32 {
    3
}

fn default_done_file_retry_ms() -> u64 {
    3000
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            meta_path: None,
            whence: Whence::default(),
            ignore_hidden: default_true(),
            ignore_file_suffix: Vec::new(),
            valid_file_pattern: default_valid_file_pattern(),
            reopen_delay_ms: default_reopen_delay_ms(),
            vanished_delay_ms: default_vanished_delay_ms(),
            vanished_retries: default_vanished_retries(),
            done_file_retry_ms: default_done_file_retry_ms(),
        }
    }
}

/// `[sender]` section: endpoint, repository and encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Field selection, e.g. `"ab, abc a1, ..."`. Empty ships everything.
    #[serde(default)]
    pub fields: String,
    /// Declaration used to create the repository when missing.
    #[serde(default)]
    pub schema_declaration: Option<String>,
    #[serde(default = "default_schema_refresh_secs")]
    pub schema_refresh_secs: u64,
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    #[serde(default)]
    pub field_policy: FieldPolicy,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries of 5xx responses per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_repo() -> String {
    "logs".to_string()
}

fn default_schema_refresh_secs() -> u64 {
    300
}

fn default_max_batch_bytes() -> usize {
    DEFAULT_MAX_BATCH_BYTES
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            repo: default_repo(),
            token_env: None,
            fields: String::new(),
            schema_declaration: None,
            schema_refresh_secs: default_schema_refresh_secs(),
            max_batch_bytes: default_max_batch_bytes(),
            field_policy: FieldPolicy::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

/// `[pipeline]` section: glue between reader and sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
    /// Wait before reading again when no new data arrived.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Wait before resending records the endpoint did not accept.
    #[serde(default = "default_resend_delay_ms")]
    pub resend_delay_ms: u64,
    #[serde(default = "default_max_records_per_send")]
    pub max_records_per_send: usize,
}

fn default_read_buffer_bytes() -> usize {
    64 * 1024
}

fn default_idle_poll_ms() -> u64 {
    1000
}

fn default_resend_delay_ms() -> u64 {
    1000
}

fn default_max_records_per_send() -> usize {
    1000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: default_read_buffer_bytes(),
            idle_poll_ms: default_idle_poll_ms(),
            resend_delay_ms: default_resend_delay_ms(),
            max_records_per_send: default_max_records_per_send(),
        }
    }
}
