//! Ed25519 verification of signed entitlement tokens.
//!
//! The signed message is the token's fields (minus `signature`) serialized as
//! compact JSON with object keys sorted lexicographically at every level, so
//! issuers and verifiers agree regardless of field insertion order.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Returns `value` with all object keys in lexicographic order.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// The exact bytes a signature covers.
#[must_use]
pub fn signing_bytes(payload: &Value) -> Vec<u8> {
    canonicalize(payload).to_string().into_bytes()
}

/// Verifies `signature` (standard base64) over the canonical form of `payload`.
///
/// Fails closed: malformed base64, a bad key, a wrong-length signature or a
/// mismatch all return `false`.
#[must_use]
pub fn verify_signature(payload: &Value, signature: &str, public_key: &[u8; 32]) -> bool {
    let Ok(sig_bytes) = STANDARD.decode(signature.trim()) else {
        debug!("signature is not valid base64");
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        debug!("signature has wrong length");
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        debug!("public key is not a valid Ed25519 point");
        return false;
    };

    verifying_key
        .verify(&signing_bytes(payload), &signature)
        .is_ok()
}
