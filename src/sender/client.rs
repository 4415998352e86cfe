//! Delivery endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::config::SenderConfig;

use super::error::{DeliveryError, SenderError};
use super::schema::RemoteSchema;

/// Transport to a structured-data endpoint.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Fetch the schema of `repo`.
    async fn get_schema(&self, repo: &str) -> Result<RemoteSchema, DeliveryError>;

    /// Create `repo` with `schema`.
    async fn create_repo(&self, repo: &str, schema: &RemoteSchema) -> Result<(), DeliveryError>;

    /// Post one batch of `count` newline-terminated lines.
    ///
    /// Returns the indices of rejected records within the batch; empty when
    /// every record was accepted. An error means the whole batch failed.
    async fn post_batch(
        &self,
        repo: &str,
        body: Vec<u8>,
        count: usize,
    ) -> Result<Vec<usize>, DeliveryError>;
}

/// Build an HTTP client with the configured timeouts.
fn build_http_client(connect: Duration, request: Duration) -> Result<Client, SenderError> {
    Client::builder()
        .connect_timeout(connect)
        .timeout(request)
        .build()
        .map_err(|e| SenderError::HttpClient(e.to_string()))
}

/// Retry only 5xx responses, up to `max_retries` times.
fn should_retry(status_code: u16, attempt: u32, max_retries: u32) -> bool {
    if attempt >= max_retries {
        return false;
    }
    (500..600).contains(&status_code)
}

/// Exponential backoff: base, 2×base, 4×base, ...
fn calculate_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.min(16))
}

fn request_error(e: &reqwest::Error) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Request(e.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostDataResponse {
    #[serde(default)]
    rejected: Vec<usize>,
}

/// HTTP implementation of [`DeliveryClient`].
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    max_retries: u32,
    retry_base: Duration,
}

impl HttpDeliveryClient {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, SenderError> {
        let endpoint = Url::parse(endpoint).map_err(|source| SenderError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;
        Ok(Self {
            client: build_http_client(connect_timeout, request_timeout)?,
            endpoint,
            token,
            max_retries: 3,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Create a client from the `[sender]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid or the token variable is
    /// named but unset.
    pub fn from_config(config: &SenderConfig) -> Result<Self, SenderError> {
        let token = match &config.token_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| SenderError::MissingToken(var.clone()))?,
            ),
            None => None,
        };
        Ok(Self::new(
            &config.endpoint,
            token,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_retries(config.max_retries, Duration::from_millis(config.retry_base_ms)))
    }

    /// Override the 5xx retry count and backoff base.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, base: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base = base;
        self
    }

    fn repo_url(&self, repo: &str, suffix: &str) -> String {
        format!(
            "{}/v2/repos/{repo}{suffix}",
            self.endpoint.as_str().trim_end_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send the request built by `build`, retrying 5xx responses.
    ///
    /// Returns the first non-retryable response, successful or not.
    async fn execute<F>(&self, build: F) -> Result<Response, DeliveryError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            let response = self
                .authorize(build())
                .send()
                .await
                .map_err(|e| request_error(&e))?;

            let status_code = response.status().as_u16();
            if should_retry(status_code, attempt, self.max_retries) {
                let backoff = calculate_backoff(self.retry_base, attempt);
                tracing::warn!(
                    status = status_code,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis(),
                    "Endpoint error, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }
            return Ok(response);
        }
    }
}

async fn status_error(response: Response) -> DeliveryError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    DeliveryError::Status { status, body }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn get_schema(&self, repo: &str) -> Result<RemoteSchema, DeliveryError> {
        let url = self.repo_url(repo, "");
        let response = self.execute(|| self.client.get(&url)).await?;
        match response.status() {
            status if status.is_success() => response
                .json::<RemoteSchema>()
                .await
                .map_err(|e| DeliveryError::Parse(e.to_string())),
            StatusCode::NOT_FOUND => Err(DeliveryError::RepoNotFound(repo.to_string())),
            _ => Err(status_error(response).await),
        }
    }

    async fn create_repo(&self, repo: &str, schema: &RemoteSchema) -> Result<(), DeliveryError> {
        let url = self.repo_url(repo, "");
        let response = self
            .execute(|| self.client.post(&url).json(schema))
            .await?;
        if response.status().is_success() {
            tracing::info!(repo, fields = schema.entries().len(), "Created repository");
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn post_batch(
        &self,
        repo: &str,
        body: Vec<u8>,
        count: usize,
    ) -> Result<Vec<usize>, DeliveryError> {
        let url = self.repo_url(repo, "/data");
        let response = self
            .execute(|| {
                self.client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "text/plain")
                    .body(body.clone())
            })
            .await?;

        match response.status() {
            status if status.is_success() => {
                let text = response.text().await.map_err(|e| request_error(&e))?;
                if text.trim().is_empty() {
                    return Ok(Vec::new());
                }
                let parsed: PostDataResponse = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(error = %e, "Unrecognized data response, treating as accepted");
                        PostDataResponse::default()
                    }
                };
                let mut rejected: Vec<usize> =
                    parsed.rejected.into_iter().filter(|&i| i < count).collect();
                rejected.sort_unstable();
                rejected.dedup();
                Ok(rejected)
            }
            StatusCode::NOT_FOUND => Err(DeliveryError::RepoNotFound(repo.to_string())),
            _ => Err(status_error(response).await),
        }
    }
}
