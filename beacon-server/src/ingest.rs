//! Ingestion pipeline
//!
//! Each batch runs through four stages per envelope: validate against the
//! protocol contract, scrub denylisted property keys, enrich with
//! receipt-side fields, insert idempotently. One bad envelope drops alone;
//! batch-level ceiling violations reject the whole request because retrying
//! the identical payload can never succeed.

use std::net::SocketAddr;
use std::sync::Arc;

use beacon_core::pii;
use beacon_core::protocol::{limits, validate_envelope, IngestRequest, IngestResponse};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::store::{EventStore, InsertOutcome};

/// Whole-request rejection. The client must not retry these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRejection {
    /// More envelopes than the per-request ceiling allows
    TooManyEvents,
    /// Request body exceeds the payload ceiling
    PayloadTooLarge,
}

impl BatchRejection {
    pub fn message(&self) -> &'static str {
        match self {
            BatchRejection::TooManyEvents => "too many events in batch",
            BatchRejection::PayloadTooLarge => "payload too large",
        }
    }
}

/// Receipt-side request metadata used for enrichment
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Peer address of the submitting client
    pub remote_addr: Option<SocketAddr>,
    /// Raw User-Agent header value
    pub user_agent: Option<String>,
}

/// Batch processor over the event store
pub struct IngestService {
    store: Arc<EventStore>,
}

impl IngestService {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Enforce the payload ceiling on the raw body, before it is decoded
    pub fn check_payload(&self, payload_bytes: usize) -> std::result::Result<(), BatchRejection> {
        if payload_bytes > limits::MAX_PAYLOAD_BYTES {
            return Err(BatchRejection::PayloadTooLarge);
        }
        Ok(())
    }

    /// Enforce the per-request envelope count ceiling
    pub fn check_batch(&self, request: &IngestRequest) -> std::result::Result<(), BatchRejection> {
        if request.events.len() > limits::MAX_BATCH_EVENTS {
            return Err(BatchRejection::TooManyEvents);
        }
        Ok(())
    }

    /// Process one accepted batch envelope by envelope.
    ///
    /// Only a store failure aborts the batch; every validation outcome is
    /// accounted for in the response counts, which always satisfy
    /// `received = inserted + duplicates + dropped`.
    pub fn process(&self, request: IngestRequest, meta: &RequestMeta) -> Result<IngestResponse> {
        let mut response = IngestResponse {
            received: request.events.len(),
            ..Default::default()
        };

        let received_at = Utc::now();
        let ip_hash = meta.remote_addr.map(|addr| hash_ip(&addr));
        let client_summary = meta.user_agent.as_deref().map(summarize_user_agent);

        for value in request.events {
            let mut envelope = match validate_envelope(value) {
                Ok(envelope) => envelope,
                Err(reason) => {
                    tracing::debug!(reason = reason.as_str(), "Dropping envelope");
                    response.dropped += 1;
                    continue;
                }
            };

            let scrubbed = pii::scrub_map(&mut envelope.properties);
            if scrubbed > 0 {
                tracing::warn!(
                    event = %envelope.name,
                    scrubbed,
                    "Removed denylisted property keys at ingest"
                );
            }

            envelope.received_at = Some(received_at);
            envelope.ip_hash = ip_hash.clone();
            envelope.client_summary = client_summary.clone();

            match self.store.insert_event(&envelope)? {
                InsertOutcome::Inserted => response.inserted += 1,
                InsertOutcome::Duplicate => response.duplicates += 1,
            }
        }

        tracing::info!(
            received = response.received,
            inserted = response.inserted,
            duplicates = response.duplicates,
            dropped = response.dropped,
            "Processed batch"
        );

        Ok(response)
    }
}

/// SHA-256 of the client IP, hex encoded. The raw address is never stored.
fn hash_ip(addr: &SocketAddr) -> String {
    let mut hasher = Sha256::new();
    hasher.update(addr.ip().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Collapse a User-Agent header to a coarse product token. The full header
/// can fingerprint a device, so only the first product name survives.
fn summarize_user_agent(user_agent: &str) -> String {
    let product = user_agent
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .split('/')
        .next()
        .unwrap_or("unknown");

    if product.is_empty() {
        "unknown".to_string()
    } else {
        product.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::envelope::{Envelope, Environment, EventContext, Platform, SCHEMA_VERSION};

    fn make_service() -> IngestService {
        let store = EventStore::open_in_memory().unwrap();
        store.migrate().unwrap();
        IngestService::new(Arc::new(store))
    }

    fn envelope_value(id: &str) -> serde_json::Value {
        serde_json::to_value(Envelope {
            schema_version: SCHEMA_VERSION,
            event_id: id.to_string(),
            name: "app_opened".to_string(),
            client_ts: Utc::now(),
            received_at: None,
            anonymous_id: "anon-1".to_string(),
            user_id: None,
            session_id: "sess-1".to_string(),
            platform: Platform::Ios,
            app_name: "demo".to_string(),
            app_version: "1.0.0".to_string(),
            build: "1".to_string(),
            environment: Environment::Development,
            context: EventContext::default(),
            properties: serde_json::Map::new(),
            ip_hash: None,
            client_summary: None,
        })
        .unwrap()
    }

    fn meta_with_addr() -> RequestMeta {
        RequestMeta {
            remote_addr: Some("203.0.113.9:4455".parse().unwrap()),
            user_agent: Some("BeaconSDK/1.0 (iPhone; iOS 17)".to_string()),
        }
    }

    #[test]
    fn test_counts_balance_with_mixed_batch() {
        let service = make_service();
        let request = IngestRequest {
            events: vec![
                envelope_value("evt-1"),
                envelope_value("evt-1"),
                serde_json::json!({ "not": "an envelope" }),
                envelope_value("evt-2"),
            ],
        };

        let response = service.process(request, &RequestMeta::default()).unwrap();
        assert_eq!(response.received, 4);
        assert_eq!(response.inserted, 2);
        assert_eq!(response.duplicates, 1);
        assert_eq!(response.dropped, 1);
        assert!(response.is_balanced());
    }

    #[test]
    fn test_enrichment_fields_set() {
        let service = make_service();
        let request = IngestRequest {
            events: vec![envelope_value("evt-1")],
        };

        service.process(request, &meta_with_addr()).unwrap();

        let stored = service.store().recent(1).unwrap().remove(0);
        assert!(stored.received_at.is_some());
        // 64 hex chars, never the raw address
        let ip_hash = stored.ip_hash.unwrap();
        assert_eq!(ip_hash.len(), 64);
        assert!(!ip_hash.contains("203.0.113.9"));
        assert_eq!(stored.client_summary.as_deref(), Some("beaconsdk"));
    }

    #[test]
    fn test_client_supplied_server_fields_overwritten() {
        let service = make_service();
        let mut value = envelope_value("evt-1");
        value["ip_hash"] = serde_json::json!("spoofed");
        value["received_at"] = serde_json::json!("2000-01-01T00:00:00Z");

        let request = IngestRequest { events: vec![value] };
        service.process(request, &RequestMeta::default()).unwrap();

        let stored = service.store().recent(1).unwrap().remove(0);
        assert!(stored.ip_hash.is_none());
        assert!(stored.received_at.unwrap() > "2020-01-01T00:00:00Z".parse::<chrono::DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_denylisted_properties_scrubbed_at_ingest() {
        let service = make_service();
        let mut value = envelope_value("evt-1");
        value["properties"] = serde_json::json!({
            "email": "a@b.com",
            "plan": "pro",
        });

        let request = IngestRequest { events: vec![value] };
        let response = service.process(request, &RequestMeta::default()).unwrap();
        assert_eq!(response.inserted, 1);

        let stored = service.store().recent(1).unwrap().remove(0);
        assert!(!stored.properties.contains_key("email"));
        assert_eq!(stored.properties["plan"], "pro");
    }

    #[test]
    fn test_batch_ceilings() {
        let service = make_service();

        assert_eq!(
            service.check_payload(limits::MAX_PAYLOAD_BYTES + 1),
            Err(BatchRejection::PayloadTooLarge)
        );
        assert!(service.check_payload(1000).is_ok());

        let too_many = IngestRequest {
            events: (0..limits::MAX_BATCH_EVENTS + 1)
                .map(|i| envelope_value(&format!("evt-{i}")))
                .collect(),
        };
        assert_eq!(
            service.check_batch(&too_many),
            Err(BatchRejection::TooManyEvents)
        );

        let fine = IngestRequest {
            events: vec![envelope_value("evt-1")],
        };
        assert!(service.check_batch(&fine).is_ok());
    }

    #[test]
    fn test_user_agent_summaries() {
        assert_eq!(summarize_user_agent("BeaconSDK/1.2 (Android 14)"), "beaconsdk");
        assert_eq!(summarize_user_agent("okhttp/4.12.0"), "okhttp");
        assert_eq!(summarize_user_agent(""), "unknown");
    }
}
