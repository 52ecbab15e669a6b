//! Payment callback signature verification.
//!
//! The authority signs `"{authority_order_id}|{payment_id}"` with
//! HMAC-SHA256 under the shared key secret and sends the hex digest.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

/// Verifies callback signatures with the shared key secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SignatureVerifier {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Hex HMAC-SHA256 of `"{authority_order_id}|{payment_id}"`.
    #[must_use]
    pub fn sign(&self, authority_order_id: &str, payment_id: &str) -> String {
        // HMAC accepts keys of any length, so this cannot fail.
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
        else {
            return String::new();
        };
        mac.update(authority_order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Whether `signature` is the authority's signature for this payment.
    #[must_use]
    pub fn verify(&self, authority_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = self.sign(authority_order_id, payment_id);
        !expected.is_empty() && constant_time_compare(&expected, &signature.to_ascii_lowercase())
    }
}

/// Compare two strings without short-circuiting on the first difference.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
