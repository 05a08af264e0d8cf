//! HMAC-SHA512 webhook signatures.
//!
//! Paystack signs the raw request body with the account's secret key and
//! sends the lowercase hex digest in `x-paystack-signature`. Secrets are never
//! logged or included in error messages.

use ring::hmac;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Hex-encoded `HMAC-SHA512(secret, body)`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA512, secret.as_bytes());
    hex::encode(hmac::sign(&key, body).as_ref())
}

/// Constant-time check of a hex signature against `body`.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else { return false };
    let key = hmac::Key::new(hmac::HMAC_SHA512, secret.as_bytes());
    hmac::verify(&key, body, &signature).is_ok()
}
