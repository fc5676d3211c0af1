//! HMAC-SHA256 signing for provider requests and callbacks.
//!
//! Outbound initiation requests are signed over
//! `merchantId + amount + reference + timestamp`; inbound callbacks are
//! signed over the raw body. Verification decodes the hex signature and
//! compares through the HMAC implementation's constant-time check, so a
//! forged callback leaks no timing information.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message` under `secret`.
pub fn sign(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Signature input for an outbound initiation request.
pub fn initiation_message(merchant_id: &str, amount: u64, reference: &str, timestamp: i64) -> String {
    format!("{merchant_id}{amount}{reference}{timestamp}")
}

/// Verify a provider callback signature against the raw request body.
///
/// Returns `false` for malformed hex as well as for a mismatch; callers
/// treat both identically and must not mutate any state on `false`.
pub fn verify(secret: &str, raw_body: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(raw_body.as_bytes());
    // Constant-time comparison.
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_round_trip() {
        let secret = "sandbox_secret";
        let body = r#"{"reference":"EXF-1","transaction_id":"t","status":"SUCCESS","amount":5}"#;
        let signature = sign(secret, body);

        assert!(verify(secret, body, &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let body = "payload";
        let signature = sign("secret-a", body);

        assert!(!verify("secret-b", body, &signature));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let secret = "s";
        let signature = sign(secret, "amount=5000");

        assert!(!verify(secret, "amount=50000", &signature));
    }

    #[test]
    fn test_verify_rejects_malformed_hex() {
        assert!(!verify("s", "body", "not-hex-at-all"));
        assert!(!verify("s", "body", ""));
    }

    #[test]
    fn test_initiation_message_layout() {
        let msg = initiation_message("EXF_MERCHANT", 20000, "EXF-PAY-1", 1756400000);
        assert_eq!(msg, "EXF_MERCHANT20000EXF-PAY-11756400000");
    }
}
