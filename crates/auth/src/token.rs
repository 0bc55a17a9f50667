//! Manager-token signing and verification (spec §4.B, §6).
//!
//! Token shape: `base64url(header) + "." + base64url(payload) + "." +
//! base64url(HMAC-SHA256(secret, header + "." + payload))`. Grounded on the
//! teacher's `token_eq` constant-time comparison
//! (`crates/gateway/src/nodes/ws.rs`), generalised from a single shared
//! secret to a full three-segment signed payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use presence_protocol::ManagerTokenPayload;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid segment encoding")]
    InvalidSegmentEncoding,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    TokenExpired,
    #[error("secret missing")]
    SecretMissing,
}

/// Splits `h.b.s`, fails fast on anything but exactly three segments.
fn split_segments(token: &str) -> Result<(&str, &str, &str), TokenError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(b), Some(s), None) if !h.is_empty() && !b.is_empty() && !s.is_empty() => {
            Ok((h, b, s))
        }
        _ => Err(TokenError::InvalidFormat),
    }
}

/// Signs `header.payload` with HMAC-SHA256 and returns the compact token.
pub fn sign(secret: &str, header: &str, payload: &ManagerTokenPayload) -> Result<String, TokenError> {
    let header_b64 = URL_SAFE_NO_PAD.encode(header.as_bytes());
    let payload_json =
        serde_json::to_vec(payload).map_err(|_| TokenError::InvalidSegmentEncoding)?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::SecretMissing)?;
    mac.update(signing_input.as_bytes());
    let sig = mac.finalize().into_bytes();
    let sig_b64 = URL_SAFE_NO_PAD.encode(sig);

    Ok(format!("{signing_input}.{sig_b64}"))
}

/// Verifies a manager token against `secret`, returning the decoded payload.
/// `now_seconds` is injected so expiry checks stay deterministic in tests.
pub fn verify(
    token: &str,
    secret: &str,
    now_seconds: i64,
) -> Result<ManagerTokenPayload, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::SecretMissing);
    }

    let (header_b64, payload_b64, sig_b64) = split_segments(token)?;

    let is_base64url = |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !is_base64url(header_b64) || !is_base64url(payload_b64) || !is_base64url(sig_b64) {
        return Err(TokenError::InvalidSegmentEncoding);
    }

    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::SecretMissing)?;
    mac.update(signing_input.as_bytes());
    let expected = mac.finalize().into_bytes();

    let provided_sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| TokenError::InvalidSegmentEncoding)?;

    if provided_sig.len() != expected.len() || !bool::from(provided_sig.ct_eq(&expected)) {
        return Err(TokenError::InvalidSignature);
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::InvalidSegmentEncoding)?;
    let payload: ManagerTokenPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::InvalidSegmentEncoding)?;

    if let Some(exp) = payload.exp {
        if now_seconds > exp {
            return Err(TokenError::TokenExpired);
        }
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(agent_id: &str, exp: Option<i64>) -> ManagerTokenPayload {
        ManagerTokenPayload {
            agent_id: Some(agent_id.to_string()),
            namespace: Some("alpha".to_string()),
            exp,
            ..Default::default()
        }
    }

    #[test]
    fn round_trips_with_correct_secret() {
        let p = payload("a.x.office.xyz", None);
        let token = sign("s3cret", "presence-v1", &p).unwrap();
        let decoded = verify(&token, "s3cret", 1_000).unwrap();
        assert_eq!(decoded.agent_id, p.agent_id);
        assert_eq!(decoded.namespace, p.namespace);
    }

    #[test]
    fn rejects_wrong_secret() {
        let p = payload("a.x.office.xyz", None);
        let token = sign("s3cret", "presence-v1", &p).unwrap();
        assert_eq!(
            verify(&token, "wrong", 1_000),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_tampered_payload_segment() {
        let p = payload("a.x.office.xyz", None);
        let token = sign("s3cret", "presence-v1", &p).unwrap();
        let mut segments: Vec<&str> = token.split('.').collect();
        let tampered_payload = URL_SAFE_NO_PAD.encode(b"{\"agentId\":\"mallory\"}");
        segments[1] = &tampered_payload;
        let tampered = segments.join(".");
        assert_eq!(
            verify(&tampered, "s3cret", 1_000),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_expired_token() {
        let p = payload("a.x.office.xyz", Some(500));
        let token = sign("s3cret", "presence-v1", &p).unwrap();
        assert_eq!(
            verify(&token, "s3cret", 1_000),
            Err(TokenError::TokenExpired)
        );
    }

    #[test]
    fn accepts_future_expiry() {
        let p = payload("a.x.office.xyz", Some(2_000));
        let token = sign("s3cret", "presence-v1", &p).unwrap();
        assert!(verify(&token, "s3cret", 1_000).is_ok());
    }

    #[test]
    fn rejects_malformed_segment_count() {
        assert_eq!(
            verify("only.two", "s3cret", 0),
            Err(TokenError::InvalidFormat)
        );
    }

    #[test]
    fn empty_secret_fails_fast() {
        assert_eq!(verify("a.b.c", "", 0), Err(TokenError::SecretMissing));
    }
}
