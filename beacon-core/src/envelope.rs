//! The telemetry event envelope
//!
//! An envelope is one self-describing telemetry record. The client builds it
//! from the raw event name/properties plus ambient context; the server fills
//! in the receipt-side fields during enrichment.
//!
//! ## Timestamp semantics
//!
//! ```text
//! host app -> Beacon SDK -> ingestion server
//!    client_ts (set at track)    received_at (set server-side)
//! ```
//!
//! Envelopes are immutable once built: the SDK never rewrites a queued
//! envelope, and the store never updates a record after insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope schema version, stamped on every record at build time.
///
/// Fixed per record; never mutated after insert.
pub const SCHEMA_VERSION: i32 = 1;

/// Client platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            _ => Err(format!("unknown platform: {}", s)),
        }
    }
}

/// Deployment environment the event was produced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            _ => Err(format!("unknown environment: {}", s)),
        }
    }
}

/// Ambient navigation/device context attached to an envelope.
///
/// All fields are optional; absent fields are omitted from the wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Screen name the event was produced on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    /// Route/path within the app
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Previous screen or external referrer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// BCP-47 locale tag (e.g., "en-US")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// IANA timezone name (e.g., "America/New_York")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Device model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    /// OS version string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// Network type at emit time (wifi, cellular, offline)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

impl EventContext {
    /// True if no field is set
    pub fn is_empty(&self) -> bool {
        self == &EventContext::default()
    }
}

/// One normalized, self-describing telemetry record.
///
/// The `event_id` is the sole idempotency key: it is unique across the store
/// for the lifetime of the system, and a repeat insert is detected and
/// counted rather than duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope schema version (see [`SCHEMA_VERSION`])
    pub schema_version: i32,
    /// Globally unique, client-generated event identifier
    pub event_id: String,
    /// Event name (e.g., "checkout_started")
    pub name: String,
    /// When the client produced the event
    pub client_ts: DateTime<Utc>,
    /// When the server received the event (set server-side only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    /// Stable per-install identifier, present before/without authentication
    pub anonymous_id: String,
    /// Authenticated user identifier, present after sign-in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session identifier, rotated after a background gap
    pub session_id: String,
    /// Client platform
    pub platform: Platform,
    /// Application name
    pub app_name: String,
    /// Application version (marketing version)
    pub app_version: String,
    /// Build identifier
    pub build: String,
    /// Deployment environment
    pub environment: Environment,
    /// Ambient navigation/device context
    #[serde(default, skip_serializing_if = "EventContext::is_empty")]
    pub context: EventContext,
    /// Free-form event properties (JSON-safe, PII-scrubbed)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// SHA-256 hash of the client network address (set server-side only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    /// Coarse client-type summary from the user agent (set server-side only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_summary: Option<String>,
}

impl Envelope {
    /// Serialized size of the whole envelope in bytes
    pub fn encoded_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Serialized size of the properties sub-record in bytes
    pub fn properties_size(&self) -> usize {
        serde_json::to_vec(&self.properties)
            .map(|v| v.len())
            .unwrap_or(usize::MAX)
    }
}
