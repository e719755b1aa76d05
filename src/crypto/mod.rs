//! Request signing and payload-field decryption.

pub mod decrypt;
pub mod sign;

pub use decrypt::{decrypt_field, decrypt_payload_fields};
pub use sign::{
    compact_json, sign_sha256, signature_headers, strip_signature_headers,
    verify_incoming_signature,
};

/// Header carrying the outgoing/incoming request signature.
pub const SIGNATURE_HEADER: &str = "X-Port-Signature";
/// Header carrying the unix-seconds timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Port-Timestamp";
