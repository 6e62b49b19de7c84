//! PII key scrubbing
//!
//! The free-form properties map (and anything nested inside it) must not
//! carry identity-revealing field names at rest. The client scrubs before
//! enqueueing; the server scrubs again during ingestion so a client that
//! bypasses the SDK cannot land PII in the store.

use serde_json::{Map, Value};

/// Property key names that are never stored, matched case-insensitively
pub const DENYLIST: &[&str] = &[
    "email",
    "e_mail",
    "phone",
    "phone_number",
    "first_name",
    "last_name",
    "full_name",
    "address",
    "street_address",
    "postal_code",
    "zip_code",
    "ssn",
    "social_security_number",
    "password",
    "credit_card",
    "card_number",
    "ip",
    "ip_address",
    "date_of_birth",
    "dob",
    "latitude",
    "longitude",
];

/// True if the key matches the denylist (case-insensitive)
pub fn is_denylisted(key: &str) -> bool {
    DENYLIST.iter().any(|d| key.eq_ignore_ascii_case(d))
}

/// Remove denylisted keys from a JSON map, recursing into nested maps and
/// arrays. Returns the number of keys removed.
pub fn scrub_map(map: &mut Map<String, Value>) -> usize {
    let denied: Vec<String> = map
        .keys()
        .filter(|k| is_denylisted(k))
        .cloned()
        .collect();

    let mut removed = denied.len();
    for key in denied {
        map.remove(&key);
    }

    for value in map.values_mut() {
        removed += scrub_value(value);
    }

    removed
}

/// Recursive helper over arbitrary JSON values
fn scrub_value(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => scrub_map(map),
        Value::Array(items) => items.iter_mut().map(scrub_value).sum(),
        _ => 0,
    }
}
