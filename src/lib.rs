//! logship - ship JSON log files from a directory to a schema-aware endpoint.
//!
//! The [`reader`] tails a directory of rotating files and checkpoints its
//! position, the [`sender`] encodes records against the repository schema
//! and delivers them in batches, and [`pipeline`] connects the two.

pub mod config;
pub mod pipeline;
pub mod reader;
pub mod sender;
