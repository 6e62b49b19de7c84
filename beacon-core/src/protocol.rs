//! Wire protocol for the ingestion endpoint
//!
//! A single endpoint accepts a batch of envelopes and answers with four
//! counts. Batch-level ceilings are terminal failures (the identical request
//! can never succeed), while a single bad envelope is dropped on its own
//! without failing its siblings. To keep that per-envelope independence,
//! the request body carries raw JSON values that are decoded one at a time
//! during validation.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Protocol size ceilings, enforced server-side and advisory client-side
pub mod limits {
    /// Max total request payload in bytes
    pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;
    /// Max envelopes per request
    pub const MAX_BATCH_EVENTS: usize = 50;
    /// Max serialized size of one envelope in bytes
    pub const MAX_EVENT_BYTES: usize = 10 * 1024;
    /// Max serialized size of the properties sub-record in bytes
    pub const MAX_PROPERTIES_BYTES: usize = 5 * 1024;
}

/// Request body for POST /v1/events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Envelopes, decoded individually so one malformed entry only drops
    /// itself
    pub events: Vec<serde_json::Value>,
}

/// Response body for POST /v1/events
///
/// Invariant: `received = inserted + duplicates + dropped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Envelopes present in the request
    pub received: usize,
    /// Envelopes newly stored
    pub inserted: usize,
    /// Envelopes already present in the store (counted, not re-inserted)
    pub duplicates: usize,
    /// Envelopes rejected by validation
    pub dropped: usize,
}

impl IngestResponse {
    /// Check the response count invariant
    pub fn is_balanced(&self) -> bool {
        self.received == self.inserted + self.duplicates + self.dropped
    }
}

/// Why a single envelope was dropped during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Body did not decode into an envelope (missing required field or
    /// unknown enum value)
    Malformed,
    /// Empty event identifier
    EmptyEventId,
    /// Empty event name
    EmptyName,
    /// Serialized envelope exceeds the per-event ceiling
    EventTooLarge,
    /// Serialized properties exceed the per-properties ceiling
    PropertiesTooLarge,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::EmptyEventId => "empty_event_id",
            DropReason::EmptyName => "empty_name",
            DropReason::EventTooLarge => "event_too_large",
            DropReason::PropertiesTooLarge => "properties_too_large",
        }
    }
}

/// Validate one raw envelope value against the protocol contract.
///
/// Checks required-field presence and enum membership (via typed decode),
/// then the per-event and per-properties size ceilings. Client-supplied
/// server-only fields are cleared; the server re-derives them during
/// enrichment.
pub fn validate_envelope(value: serde_json::Value) -> Result<Envelope, DropReason> {
    let mut envelope: Envelope =
        serde_json::from_value(value).map_err(|_| DropReason::Malformed)?;

    if envelope.event_id.trim().is_empty() {
        return Err(DropReason::EmptyEventId);
    }
    if envelope.name.trim().is_empty() {
        return Err(DropReason::EmptyName);
    }

    // Never trust receipt-side fields from the wire
    envelope.received_at = None;
    envelope.ip_hash = None;
    envelope.client_summary = None;

    if envelope.properties_size() > limits::MAX_PROPERTIES_BYTES {
        return Err(DropReason::PropertiesTooLarge);
    }
    if envelope.encoded_size() > limits::MAX_EVENT_BYTES {
        return Err(DropReason::EventTooLarge);
    }

    Ok(envelope)
}
