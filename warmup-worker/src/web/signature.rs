//! Svix webhook signature verification.
//!
//! Resend signs webhook requests through Svix using HMAC-SHA256 over
//! `"{svix-id}.{svix-timestamp}.{body}"`.
//! Reference: https://docs.svix.com/receiving/verifying-payloads/how-manual

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::error::{Result, WarmupError};

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Verify a Svix webhook signature.
///
/// # Arguments
///
/// * `secret` - The endpoint signing secret (`whsec_<base64 key>`)
/// * `id` - The `svix-id` header
/// * `timestamp` - The `svix-timestamp` header, Unix epoch seconds
/// * `signatures` - The `svix-signature` header: space-separated `v1,<base64>` entries
/// * `body` - The raw request body, exactly as received
/// * `max_age_seconds` - Allowed clock distance in either direction
///
/// # Errors
///
/// `Validation` when a field is empty, `Authentication` when the timestamp
/// is unparseable or stale, the secret is unusable, or no signature matches.
pub fn verify_svix_signature(
    secret: &str,
    id: &str,
    timestamp: &str,
    signatures: &str,
    body: &[u8],
    max_age_seconds: u64,
) -> Result<()> {
    if secret.is_empty() || id.is_empty() || timestamp.is_empty() || signatures.is_empty() {
        warn!(
            has_secret = !secret.is_empty(),
            has_id = !id.is_empty(),
            has_timestamp = !timestamp.is_empty(),
            has_signature = !signatures.is_empty(),
            "svix_signature_missing_fields"
        );
        return Err(WarmupError::Validation("missing signature fields".to_string()));
    }

    let webhook_time: u64 = match timestamp.parse() {
        Ok(t) => t,
        Err(_) => {
            warn!(timestamp = %timestamp, "svix_signature_invalid_timestamp");
            return Err(WarmupError::Authentication("invalid timestamp".to_string()));
        }
    };

    let current_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let age = current_time.abs_diff(webhook_time);

    if age > max_age_seconds {
        warn!(
            webhook_time = webhook_time,
            current_time = current_time,
            age_seconds = age,
            max_age_seconds = max_age_seconds,
            "svix_signature_stale"
        );
        return Err(WarmupError::Authentication("stale timestamp".to_string()));
    }

    let Some(expected) = decode_secret(secret).and_then(|key| sign(&key, id, timestamp, body))
    else {
        warn!("svix_signature_invalid_key");
        return Err(WarmupError::Authentication("unusable signing secret".to_string()));
    };

    let valid = signatures
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == SIGNATURE_VERSION)
        .any(|(_, sig)| constant_time_compare(&expected, sig));

    if !valid {
        warn!(
            svix_id = %id,
            candidates = signatures.split_whitespace().count(),
            "svix_signature_mismatch"
        );
        return Err(WarmupError::Authentication("signature mismatch".to_string()));
    }

    Ok(())
}

/// Signing key bytes from a `whsec_`-prefixed (or bare) base64 secret.
fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
    STANDARD.decode(encoded.trim()).ok()
}

/// Base64 HMAC-SHA256 of `"{id}.{timestamp}.{body}"`.
fn sign(key: &[u8], id: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check if a webhook secret is configured.
pub fn is_signature_verification_enabled(secret: &Option<String>) -> bool {
    secret
        .as_ref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}

/// Header value for a body signed with `secret`. Test helper for callers
/// that need to build signed requests.
#[cfg(test)]
pub(crate) fn sign_for_test(secret: &str, id: &str, timestamp: &str, body: &[u8]) -> String {
    let key = decode_secret(secret).unwrap();
    format!("{SIGNATURE_VERSION},{}", sign(&key, id, timestamp, body).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    // base64("test-signing-key")
    const SECRET: &str = "whsec_dGVzdC1zaWduaW5nLWtleQ==";

    fn now() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    fn is_auth_error(result: Result<()>) -> bool {
        matches!(result, Err(WarmupError::Authentication(_)))
    }

    #[test]
    fn test_verify_signature_missing_fields() {
        for (secret, id, ts, sig) in [
            ("", "msg_1", "123", "v1,sig"),
            (SECRET, "", "123", "v1,sig"),
            (SECRET, "msg_1", "", "v1,sig"),
            (SECRET, "msg_1", "123", ""),
        ] {
            assert!(matches!(
                verify_svix_signature(secret, id, ts, sig, b"{}", 300),
                Err(WarmupError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_verify_signature_invalid_timestamp() {
        assert!(is_auth_error(verify_svix_signature(
            SECRET,
            "msg_1",
            "not-a-number",
            "v1,sig",
            b"{}",
            300
        )));
    }

    #[test]
    fn test_verify_signature_stale() {
        let ts = "946684800";
        let sig = sign_for_test(SECRET, "msg_1", ts, b"{}");
        assert!(is_auth_error(verify_svix_signature(SECRET, "msg_1", ts, &sig, b"{}", 300)));
    }

    #[test]
    fn test_verify_signature_future_timestamp_rejected() {
        let ts = (now().parse::<u64>().unwrap() + 3600).to_string();
        let sig = sign_for_test(SECRET, "msg_1", &ts, b"{}");
        assert!(is_auth_error(verify_svix_signature(SECRET, "msg_1", &ts, &sig, b"{}", 300)));
    }

    #[test]
    fn test_verify_signature_valid() {
        let ts = now();
        let body = br#"{"type":"email.received"}"#;
        let sig = sign_for_test(SECRET, "msg_1", &ts, body);
        assert!(verify_svix_signature(SECRET, "msg_1", &ts, &sig, body, 300).is_ok());
    }

    #[test]
    fn test_verify_signature_any_listed_entry_matches() {
        let ts = now();
        let sig = sign_for_test(SECRET, "msg_1", &ts, b"{}");
        let header = format!("v1,bm90LWl0 {sig}");
        assert!(verify_svix_signature(SECRET, "msg_1", &ts, &header, b"{}", 300).is_ok());
    }

    #[test]
    fn test_verify_signature_tampered_body() {
        let ts = now();
        let sig = sign_for_test(SECRET, "msg_1", &ts, b"{}");
        assert!(is_auth_error(verify_svix_signature(SECRET, "msg_1", &ts, &sig, b"{ }", 300)));
        assert!(is_auth_error(verify_svix_signature(SECRET, "msg_2", &ts, &sig, b"{}", 300)));
    }

    #[test]
    fn test_verify_signature_other_version_ignored() {
        let ts = now();
        let sig = sign_for_test(SECRET, "msg_1", &ts, b"{}");
        let v2 = sig.replacen("v1,", "v2,", 1);
        assert!(is_auth_error(verify_svix_signature(SECRET, "msg_1", &ts, &v2, b"{}", 300)));
    }

    #[test]
    fn test_verify_signature_undecodable_secret() {
        let ts = now();
        assert!(is_auth_error(verify_svix_signature(
            "whsec_***",
            "msg_1",
            &ts,
            "v1,abc",
            b"{}",
            300
        )));
    }

    #[test]
    fn test_bare_secret_accepted() {
        let ts = now();
        let sig = sign_for_test(SECRET, "msg_1", &ts, b"{}");
        assert!(verify_svix_signature(
            "dGVzdC1zaWduaW5nLWtleQ==",
            "msg_1",
            &ts,
            &sig,
            b"{}",
            300
        )
        .is_ok());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_is_signature_verification_enabled() {
        assert!(!is_signature_verification_enabled(&None));
        assert!(!is_signature_verification_enabled(&Some("".to_string())));
        assert!(!is_signature_verification_enabled(&Some("   ".to_string())));
        assert!(is_signature_verification_enabled(&Some(SECRET.to_string())));
    }
}
