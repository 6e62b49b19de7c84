//! Beacon ingestion server
//!
//! Receives event batches from the mobile SDK, validates and sanitizes each
//! envelope independently, enriches it with receipt-side fields, and stores
//! it idempotently in SQLite.

pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod store;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use ingest::{BatchRejection, IngestService, RequestMeta};
pub use store::{EventStore, InsertOutcome};
