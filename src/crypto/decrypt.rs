//! AES-256-GCM decryption of designated payload fields.
//!
//! The control plane encrypts sensitive action inputs as
//! `base64(iv(16) ‖ ciphertext ‖ tag(16))`, keyed by the first 32 bytes of
//! the UTF-8 client secret. `fieldsToDecryptPaths` names the fields by
//! dotted path (numeric segments index into arrays). Decryption failures
//! never fail the run: the original value stays in place.

use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

const IV_LENGTH: usize = 16;
const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

/// AES-256-GCM with the control plane's 16-byte IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Decrypt a single base64 ciphertext with the agent's secret.
pub fn decrypt_field(encrypted: &str, key: &str) -> Result<String> {
    let raw = base64::decode(encrypted)
        .map_err(|e| Error::Crypto(format!("invalid base64: {e}")))?;
    if raw.len() <= IV_LENGTH + TAG_LENGTH {
        return Err(Error::Crypto("encrypted data is too short".to_string()));
    }
    if key.len() < KEY_LENGTH {
        return Err(Error::Crypto(
            "encryption key must be at least 32 bytes".to_string(),
        ));
    }

    let cipher = Aes256Gcm16::new_from_slice(&key.as_bytes()[..KEY_LENGTH])
        .map_err(|e| Error::Crypto(format!("invalid key: {e}")))?;
    let nonce = GenericArray::from_slice(&raw[..IV_LENGTH]);
    // The aead API expects ciphertext with the tag appended, which is
    // exactly the wire layout after the IV.
    let plaintext = cipher
        .decrypt(nonce, &raw[IV_LENGTH..])
        .map_err(|_| Error::Crypto("decryption failed".to_string()))?;
    String::from_utf8(plaintext)
        .map_err(|e| Error::Crypto(format!("decrypted data is not UTF-8: {e}")))
}

/// Decrypt every addressed field of `payload` in place. Missing paths are
/// skipped; failing paths are logged and left untouched.
pub fn decrypt_payload_fields(payload: &mut Value, paths: &[String], key: &str) {
    for path in paths {
        if path.is_empty() {
            continue;
        }
        let Some(slot) = resolve_path(payload, path) else {
            continue;
        };
        let Some(encrypted) = slot.as_str().map(str::to_string) else {
            continue;
        };
        match decrypt_field(&encrypted, key) {
            Ok(plaintext) => *slot = Value::String(plaintext),
            Err(e) => warn!(path = %path, error = %e, "failed to decrypt field, keeping original value"),
        }
    }
}

/// Walk a dotted path (`a.b.0.c`) to a mutable slot. Numeric segments index
/// arrays; anything that does not resolve yields `None`.
fn resolve_path<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}
