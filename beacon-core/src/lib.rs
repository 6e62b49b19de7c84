//! # beacon-core
//!
//! Shared types for the Beacon telemetry pipeline.
//!
//! This library provides:
//! - The event envelope model shared by the client SDK and the ingestion
//!   service
//! - The wire protocol (batch request/response) and its size limits
//! - PII key scrubbing used on both sides of the wire
//! - Logging infrastructure
//!
//! ## Data flow
//!
//! ```text
//! host app -> beacon-sdk (queue, batch, retry) -> beacon-server (validate,
//! sanitize, enrich, idempotent insert) -> SQLite event store
//! ```

// Re-export commonly used items at the crate root
pub use envelope::{Envelope, EventContext, Environment, Platform, SCHEMA_VERSION};
pub use error::{Error, Result};
pub use protocol::{limits, DropReason, IngestRequest, IngestResponse};

// Public modules
pub mod envelope;
pub mod error;
pub mod logging;
pub mod pii;
pub mod protocol;
