//! Cached remote schema with periodic refresh.
//!
//! The cached value is an `Arc` swapped under a short write lock, so
//! encoders holding a previous schema keep a consistent view while a
//! refresh lands.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::DeliveryClient;
use super::error::DeliveryError;
use super::schema::RemoteSchema;

#[derive(Debug)]
struct Cached {
    schema: Arc<RemoteSchema>,
    fetched_at: Instant,
    stale: bool,
}

/// Fetches and caches the schema of one repository.
#[derive(Debug)]
pub struct SchemaResolver {
    repo: String,
    refresh: Duration,
    cache: RwLock<Option<Cached>>,
}

impl SchemaResolver {
    #[must_use]
    pub fn new(repo: impl Into<String>, refresh: Duration) -> Self {
        Self {
            repo: repo.into(),
            refresh,
            cache: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Last fetched schema, fresh or not.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<RemoteSchema>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| Arc::clone(&c.schema))
    }

    fn fresh(&self) -> Option<Arc<RemoteSchema>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|c| !c.stale && c.fetched_at.elapsed() < self.refresh)
            .map(|c| Arc::clone(&c.schema))
    }

    /// Force the next [`resolve`](Self::resolve) to refetch.
    pub fn invalidate(&self) {
        if let Some(cached) = self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            cached.stale = true;
        }
    }

    /// Fetch the schema and replace the cached value.
    ///
    /// # Errors
    ///
    /// Returns the client error; the cached value is left untouched.
    pub async fn refresh(
        &self,
        client: &dyn DeliveryClient,
    ) -> Result<Arc<RemoteSchema>, DeliveryError> {
        let schema = Arc::new(client.get_schema(&self.repo).await?);
        tracing::debug!(repo = %self.repo, fields = schema.entries().len(), "Refreshed schema");
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Cached {
            schema: Arc::clone(&schema),
            fetched_at: Instant::now(),
            stale: false,
        });
        Ok(schema)
    }

    /// Return a fresh schema, refetching when stale.
    ///
    /// A failed refetch falls back to the previous schema when one exists.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when no schema was ever fetched.
    pub async fn resolve(
        &self,
        client: &dyn DeliveryClient,
    ) -> Result<Arc<RemoteSchema>, DeliveryError> {
        if let Some(schema) = self.fresh() {
            return Ok(schema);
        }
        match self.refresh(client).await {
            Ok(schema) => Ok(schema),
            Err(e) => match self.cached() {
                Some(schema) => {
                    tracing::warn!(repo = %self.repo, error = %e, "Schema refresh failed, using cached schema");
                    Ok(schema)
                }
                None => Err(e),
            },
        }
    }

    /// Refresh on a fixed interval until `cancel` fires.
    pub fn spawn_refresh(
        self: Arc<Self>,
        client: Arc<dyn DeliveryClient>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!(repo = %self.repo, "Schema refresh stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh(client.as_ref()).await {
                            tracing::warn!(repo = %self.repo, error = %e, "Background schema refresh failed");
                        }
                    }
                }
            }
        })
    }
}
