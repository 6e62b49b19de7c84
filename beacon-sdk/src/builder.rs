//! Envelope construction
//!
//! Merges a raw event name/properties with the ambient session, identity,
//! and app metadata into a complete [`Envelope`]. Construction is pure: no
//! enqueue, no IO beyond minting a fresh event identifier.
//!
//! Navigation context precedence: context supplied explicitly on a call
//! always overrides the ambient (auto-tracked) screen context.

use beacon_core::envelope::{Envelope, EventContext, SCHEMA_VERSION};
use beacon_core::pii;
use chrono::Utc;
use uuid::Uuid;

use crate::config::SdkConfig;
use crate::session::Identity;

/// Builds envelopes from events plus ambient state
pub struct EnvelopeBuilder {
    app_name: String,
    app_version: String,
    build: String,
    platform: beacon_core::Platform,
    environment: beacon_core::Environment,
}

impl EnvelopeBuilder {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            build: config.build.clone(),
            platform: config.platform,
            environment: config.environment,
        }
    }

    /// Build a complete envelope.
    ///
    /// `ambient` carries the device/navigation context tracked by the SDK;
    /// `explicit` (if given) wins field by field over the ambient values.
    /// Denylisted property keys are stripped before attaching.
    pub fn build(
        &self,
        name: &str,
        mut properties: serde_json::Map<String, serde_json::Value>,
        identity: &Identity,
        ambient: &EventContext,
        explicit: Option<EventContext>,
    ) -> Envelope {
        let removed = pii::scrub_map(&mut properties);
        if removed > 0 {
            tracing::warn!(event = name, removed, "Stripped denylisted property keys");
        }

        Envelope {
            schema_version: SCHEMA_VERSION,
            event_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            client_ts: Utc::now(),
            received_at: None,
            anonymous_id: identity.anonymous_id.clone(),
            user_id: identity.user_id.clone(),
            session_id: identity.session_id.clone(),
            platform: self.platform,
            app_name: self.app_name.clone(),
            app_version: self.app_version.clone(),
            build: self.build.clone(),
            environment: self.environment,
            context: merge_context(ambient, explicit),
            properties,
            ip_hash: None,
            client_summary: None,
        }
    }
}

/// Field-by-field merge, explicit values winning over ambient ones
fn merge_context(ambient: &EventContext, explicit: Option<EventContext>) -> EventContext {
    let Some(explicit) = explicit else {
        return ambient.clone();
    };

    EventContext {
        screen: explicit.screen.or_else(|| ambient.screen.clone()),
        route: explicit.route.or_else(|| ambient.route.clone()),
        referrer: explicit.referrer.or_else(|| ambient.referrer.clone()),
        locale: explicit.locale.or_else(|| ambient.locale.clone()),
        timezone: explicit.timezone.or_else(|| ambient.timezone.clone()),
        device_model: explicit.device_model.or_else(|| ambient.device_model.clone()),
        os_version: explicit.os_version.or_else(|| ambient.os_version.clone()),
        network_type: explicit.network_type.or_else(|| ambient.network_type.clone()),
    }
}
