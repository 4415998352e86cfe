//! Schema-aware batching sender.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SenderConfig;

use super::batch::{Batch, BatchBuilder};
use super::client::DeliveryClient;
use super::encoder::{FieldPolicy, RecordEncoder};
use super::error::{DeliveryError, SendError, SenderError};
use super::resolver::SchemaResolver;
use super::schema::RemoteSchema;
use super::user_schema::UserSchema;
use super::Record;

/// Maximum batch payload accepted by the endpoint.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 2 * 1024 * 1024;

/// Construction parameters for a [`Sender`].
#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub repo: String,
    pub user_schema: UserSchema,
    /// Schema used to create the repository when it does not exist.
    pub declaration: Option<RemoteSchema>,
    pub max_batch_bytes: usize,
    pub field_policy: FieldPolicy,
    pub schema_refresh: Duration,
}

impl SenderOptions {
    #[must_use]
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            user_schema: UserSchema::parse(""),
            declaration: None,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            field_policy: FieldPolicy::default(),
            schema_refresh: Duration::from_secs(300),
        }
    }

    /// Build options from the `[sender]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `SenderError::InvalidSchema` if the declaration is malformed.
    pub fn from_config(config: &SenderConfig) -> Result<Self, SenderError> {
        let declaration = match config.schema_declaration.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(RemoteSchema::parse_declaration(text)?),
            _ => None,
        };
        Ok(Self {
            repo: config.repo.clone(),
            user_schema: UserSchema::parse(&config.fields),
            declaration,
            max_batch_bytes: config.max_batch_bytes,
            field_policy: config.field_policy,
            schema_refresh: Duration::from_secs(config.schema_refresh_secs),
        })
    }
}

/// Encodes records against the remote schema and delivers them in batches.
pub struct Sender {
    repo: String,
    client: Arc<dyn DeliveryClient>,
    resolver: Arc<SchemaResolver>,
    encoder: RecordEncoder,
    batches: BatchBuilder,
    declaration: Option<RemoteSchema>,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("repo", &self.repo)
            .field("encoder", &self.encoder)
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

impl Sender {
    #[must_use]
    pub fn new(options: SenderOptions, client: Arc<dyn DeliveryClient>) -> Self {
        Self {
            resolver: Arc::new(SchemaResolver::new(
                options.repo.clone(),
                options.schema_refresh,
            )),
            repo: options.repo,
            client,
            encoder: RecordEncoder::new(options.user_schema, options.field_policy),
            batches: BatchBuilder::new(options.max_batch_bytes),
            declaration: options.declaration,
        }
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    /// Replace the field selection used by subsequent sends.
    pub fn set_user_schema(&mut self, user: UserSchema) {
        self.encoder.set_user_schema(user);
    }

    /// Make sure the repository exists, creating it from the declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is missing and no declaration is
    /// configured, or if the endpoint fails.
    pub async fn ensure_repo(&self) -> Result<(), SenderError> {
        match self.client.get_schema(&self.repo).await {
            Ok(_) => Ok(()),
            Err(DeliveryError::RepoNotFound(repo)) => match &self.declaration {
                Some(declaration) => {
                    tracing::info!(repo = %repo, "Repository missing, creating from declaration");
                    self.client.create_repo(&repo, declaration).await?;
                    Ok(())
                }
                None => Err(DeliveryError::RepoNotFound(repo).into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn schema(&self) -> Result<Arc<RemoteSchema>, DeliveryError> {
        match self.resolver.resolve(self.client.as_ref()).await {
            Err(DeliveryError::RepoNotFound(repo)) => {
                let Some(declaration) = &self.declaration else {
                    return Err(DeliveryError::RepoNotFound(repo));
                };
                tracing::info!(repo = %repo, "Repository missing, creating from declaration");
                self.client.create_repo(&repo, declaration).await?;
                self.resolver.refresh(self.client.as_ref()).await
            }
            other => other,
        }
    }

    /// Refresh the cached schema in the background until `cancel` fires.
    pub fn spawn_schema_refresh(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        Arc::clone(&self.resolver).spawn_refresh(Arc::clone(&self.client), interval, cancel)
    }

    /// Deliver `records` in order.
    ///
    /// Records that cannot be encoded are logged and dropped; resending them
    /// cannot succeed.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] carrying exactly the records the endpoint did
    /// not accept, or every record when no schema is available.
    pub async fn send(&self, records: Vec<Record>) -> Result<(), SendError> {
        if records.is_empty() {
            return Ok(());
        }

        let schema = match self.schema().await {
            Ok(schema) => schema,
            Err(e) => {
                tracing::warn!(repo = %self.repo, count = records.len(), error = %e, "Schema unavailable, deferring records");
                return Err(SendError::new(
                    records,
                    DeliveryError::SchemaUnavailable(e.to_string()),
                ));
            }
        };

        let mut encoded = Vec::with_capacity(records.len());
        for record in records {
            match self.encoder.encode(&record, &schema) {
                Ok(line) => encoded.push((record, line)),
                Err(e) => tracing::warn!(repo = %self.repo, error = %e, "Dropping record"),
            }
        }

        let mut failed = Vec::new();
        let mut cause = None;
        for Batch { records, buffer } in self.batches.build(encoded) {
            let count = records.len();
            let bytes = buffer.len();
            match self.client.post_batch(&self.repo, buffer, count).await {
                Ok(rejected) if rejected.is_empty() => {
                    tracing::debug!(repo = %self.repo, count, bytes, "Batch delivered");
                }
                Ok(rejected) => {
                    let rejected: HashSet<usize> = rejected.into_iter().collect();
                    tracing::warn!(repo = %self.repo, count, rejected = rejected.len(), "Batch partially rejected");
                    self.resolver.invalidate();
                    failed.extend(
                        records
                            .into_iter()
                            .enumerate()
                            .filter(|(i, _)| rejected.contains(i))
                            .map(|(_, r)| r),
                    );
                    cause = Some(DeliveryError::PartiallyRejected {
                        count: rejected.len(),
                    });
                }
                Err(e) => {
                    tracing::warn!(repo = %self.repo, count, error = %e, "Batch delivery failed");
                    self.resolver.invalidate();
                    failed.extend(records);
                    cause = Some(e);
                }
            }
        }

        match cause {
            None => Ok(()),
            Some(cause) => Err(SendError::new(failed, cause)),
        }
    }
}
