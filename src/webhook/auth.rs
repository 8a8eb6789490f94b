//! Webhook request signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Signs a request body. Used by tests and by processors calling us.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature` against the body in constant time.
///
/// An optional `sha256=` prefix is accepted.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"personal_id":"1","status":"finished"}"#;
        let signature = sign(b"secret", body);

        assert_eq!(signature.len(), 64);
        assert!(verify(b"secret", body, &signature));
        assert!(verify(b"secret", body, &format!("sha256={}", signature)));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signature = sign(b"secret", b"{\"status\":\"finished\"}");

        assert!(!verify(b"secret", b"{\"status\":\"cancelled\"}", &signature));
        assert!(!verify(b"other", b"{\"status\":\"finished\"}", &signature));
        assert!(!verify(b"secret", b"{\"status\":\"finished\"}", "not-hex"));
        assert!(!verify(b"secret", b"{\"status\":\"finished\"}", ""));
    }
}
