//! HMAC-SHA256 request signing shared by REST-authenticated venues.
//!
//! Most CEX derivatives APIs (Binance, OKX, Bybit, Gate.io, BingX, ...)
//! authenticate REST requests with an HMAC-SHA256 signature over a
//! canonical request string, keyed by an API secret. This is a single
//! shared implementation; each adapter decides what string it signs
//! (query string, body, or a venue-specific concatenation).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs request payloads with a venue API secret.
pub struct HmacSigner {
    secret: zeroize::Zeroizing<String>,
}

impl HmacSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: zeroize::Zeroizing::new(secret.into()),
        }
    }

    /// Sign `message` and return the lowercase hex-encoded digest, the
    /// convention every HMAC-authenticated CEX REST API expects.
    pub fn sign_hex(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_and_depends_on_key() {
        let a = HmacSigner::new("secret-a");
        let b = HmacSigner::new("secret-b");

        let sig_a1 = a.sign_hex("payload");
        let sig_a2 = a.sign_hex("payload");
        let sig_b = b.sign_hex("payload");

        assert_eq!(sig_a1, sig_a2);
        assert_ne!(sig_a1, sig_b);
    }
}
