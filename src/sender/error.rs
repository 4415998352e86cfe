//! Sender error types.

use super::Record;

/// Errors reported by a delivery endpoint.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    /// The repository does not exist on the endpoint.
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    /// The request could not be sent or its response not read.
    #[error("Delivery request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("Endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request timed out.
    #[error("Delivery request timed out")]
    Timeout,

    /// The response body could not be decoded.
    #[error("Failed to parse endpoint response: {0}")]
    Parse(String),

    /// The endpoint accepted the batch except for some records.
    #[error("Endpoint rejected {count} record(s)")]
    PartiallyRejected { count: usize },

    /// No remote schema has been fetched yet.
    #[error("Remote schema unavailable: {0}")]
    SchemaUnavailable(String),
}

/// Records a `send` call failed to deliver.
///
/// Carries exactly the unaccepted subset; resending it never duplicates
/// records the endpoint already accepted.
#[derive(thiserror::Error, Debug)]
#[error("{} record(s) not delivered: {source}", .failed.len())]
pub struct SendError {
    failed: Vec<Record>,
    source: DeliveryError,
}

impl SendError {
    #[must_use]
    pub fn new(failed: Vec<Record>, source: DeliveryError) -> Self {
        Self { failed, source }
    }

    /// Records to resubmit.
    #[must_use]
    pub fn failed(&self) -> &[Record] {
        &self.failed
    }

    #[must_use]
    pub fn into_failed(self) -> Vec<Record> {
        self.failed
    }

    /// Last delivery failure observed for the call.
    #[must_use]
    pub fn cause(&self) -> &DeliveryError {
        &self.source
    }
}

/// Errors that can occur while building a sender.
#[derive(thiserror::Error, Debug)]
pub enum SenderError {
    /// Endpoint URL is malformed.
    #[error("Invalid endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// Schema declaration could not be parsed.
    #[error("Invalid schema declaration: {0}")]
    InvalidSchema(String),

    /// Token environment variable is named but not set.
    #[error("Token not configured (env: {0})")]
    MissingToken(String),

    /// The HTTP client could not be built.
    #[error("Cannot build HTTP client: {0}")]
    HttpClient(String),

    /// The endpoint failed during setup.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// A record that cannot be rendered against the current schema.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// A field value does not match its declared type.
    #[error("Field {field} does not match type {expected}")]
    InvalidField { field: String, expected: String },

    /// A date field could not be normalized.
    #[error("Cannot parse {0} as a date")]
    InvalidDate(String),

    /// Nothing in the record maps to the schema.
    #[error("Record has no field to emit")]
    NoFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_display_counts_failed() {
        let mut record = Record::new();
        record.insert("a".into(), serde_json::json!(1));
        let err = SendError::new(vec![record.clone(), record], DeliveryError::Timeout);
        assert_eq!(
            err.to_string(),
            "2 record(s) not delivered: Delivery request timed out"
        );
        assert_eq!(err.failed().len(), 2);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_status_display() {
        let err = DeliveryError::Status {
            status: 400,
            body: "bad repo".into(),
        };
        assert_eq!(err.to_string(), "Endpoint returned HTTP 400: bad repo");
    }

    #[test]
    fn test_sender_error_from_delivery() {
        let err: SenderError = DeliveryError::RepoNotFound("nb".into()).into();
        assert!(matches!(err, SenderError::Delivery(_)));
        assert_eq!(err.to_string(), "Repository not found: nb");
    }
}
