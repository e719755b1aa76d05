//! HMAC-SHA256 request signing.
//!
//! The outgoing signer and the incoming verifier must produce byte-identical
//! canonical JSON. `compact_json` is that single canonicalizer: compact
//! separators, key order preserved as received, non-ASCII left unescaped.
//! The signing secret is the Port client secret, by contract.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::warn;

use super::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Canonical compact JSON: `(",", ":")` separators, no ASCII escaping.
/// serde_json emits exactly this; the `preserve_order` feature keeps key
/// order stable across parse/serialize so verification sees the original
/// byte layout.
pub fn compact_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// `v1,<base64(HMAC-SHA256(secret, timestamp + "." + body))>`.
pub fn sign_sha256(body: &str, secret: &str, timestamp: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    format!("v1,{}", base64::encode(mac.finalize().into_bytes()))
}

/// Signature + timestamp headers for an outgoing body, stamped now.
pub fn signature_headers(body: &Value, secret: &str) -> (String, String) {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = sign_sha256(&compact_json(body), secret, &timestamp);
    (timestamp, signature)
}

/// Remove the signature header entries from an event's `headers` block.
/// The webhook flow strips just the two signing entries; the GitLab flow
/// drops the whole block (`strip_all`), since the target never sees the
/// original headers anyway.
///
/// Removal must not disturb the order of the remaining keys (the verifier
/// re-serializes the document), hence `shift_remove`.
pub fn strip_signature_headers(event: &mut Value, strip_all: bool) {
    if strip_all {
        if let Some(obj) = event.as_object_mut() {
            obj.shift_remove("headers");
        }
        return;
    }
    if let Some(headers) = event.get_mut("headers").and_then(Value::as_object_mut) {
        headers.shift_remove(SIGNATURE_HEADER);
        headers.shift_remove(TIMESTAMP_HEADER);
    }
}

/// Verify a Port-originated event signature in place.
///
/// Events without both signature headers pass unchanged (the polling
/// transport synthesizes events that never carry them). When the headers
/// are present they are stripped per `strip_all`, the signature is
/// recomputed over the remaining document with the received timestamp, and
/// compared in constant time. Returns `false` on mismatch; the caller drops
/// the event.
pub fn verify_incoming_signature(event: &mut Value, secret: &str, strip_all: bool) -> bool {
    let received = {
        let headers = event.get("headers").and_then(Value::as_object);
        let signature = headers
            .and_then(|h| h.get(SIGNATURE_HEADER))
            .and_then(Value::as_str)
            .map(str::to_string);
        let timestamp = headers
            .and_then(|h| h.get(TIMESTAMP_HEADER))
            .and_then(Value::as_str)
            .map(str::to_string);
        match (signature, timestamp) {
            (Some(signature), Some(timestamp)) => Some((signature, timestamp)),
            _ => None,
        }
    };

    let Some((signature, timestamp)) = received else {
        return true;
    };

    strip_signature_headers(event, strip_all);
    let expected = sign_sha256(&compact_json(event), secret, &timestamp);
    let matches =
        constant_time_eq::constant_time_eq(expected.as_bytes(), signature.as_bytes());
    if !matches {
        warn!("event signature mismatch, dropping event");
    }
    matches
}
