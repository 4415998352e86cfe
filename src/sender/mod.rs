//! Batching delivery of structured records.
//!
//! Records are rendered against the repository schema fetched from the
//! endpoint, packed into byte-bounded batches and posted in order. Records
//! the endpoint does not accept come back in a [`SendError`] for retry.

mod batch;
mod client;
pub mod date;
mod dispatch;
mod encoder;
mod error;
mod resolver;
mod schema;
mod user_schema;

/// A structured record: field name to JSON value, in insertion order.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use batch::{Batch, BatchBuilder};
pub use client::{DeliveryClient, HttpDeliveryClient};
pub use date::convert_date;
pub use dispatch::{Sender, SenderOptions, DEFAULT_MAX_BATCH_BYTES};
pub use encoder::{escape, valid_schema, FieldPolicy, RecordEncoder};
pub use error::{DeliveryError, EncodeError, SendError, SenderError};
pub use resolver::SchemaResolver;
pub use schema::{RemoteSchema, SchemaEntry, ValueType};
pub use user_schema::UserSchema;
