//! Bearer token inspection.
//!
//! Tokens are JWT-shaped: `header.payload.signature`, each segment base64
//! encoded. Only the payload is read, and only for its `exp` claim. Any doubt
//! about the token collapses to "expired".

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Number of dot-separated segments in a well-formed token
const TOKEN_SEGMENTS: usize = 3;

const LENIENT_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// JWTs use the URL-safe alphabet without padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);

/// Some issuers emit the standard alphabet instead
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,

    #[error("expected 3 segments, found {0}")]
    Malformed(usize),

    #[error("payload is not valid base64")]
    Encoding,

    #[error("payload is not a JSON object: {0}")]
    Payload(String),

    #[error("payload has no usable exp claim")]
    MissingExpiry,
}

/// The claims this client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    /// Subject (usually the username), when present
    pub sub: Option<String>,
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    exp: Option<Value>,
    #[serde(default)]
    sub: Option<Value>,
}

/// Decode the payload claims of a token without verifying its signature.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != TOKEN_SEGMENTS {
        return Err(TokenError::Malformed(parts.len()));
    }

    let payload = URL_SAFE_LENIENT
        .decode(parts[1])
        .or_else(|_| STANDARD_LENIENT.decode(parts[1]))
        .map_err(|_| TokenError::Encoding)?;

    let raw: RawClaims =
        serde_json::from_slice(&payload).map_err(|e| TokenError::Payload(e.to_string()))?;

    // Only a non-zero integer counts; strings, floats and null are treated as absent
    let exp = raw
        .exp
        .as_ref()
        .and_then(Value::as_i64)
        .filter(|exp| *exp != 0)
        .ok_or(TokenError::MissingExpiry)?;

    let sub = raw.sub.and_then(|v| v.as_str().map(str::to_string));

    Ok(TokenClaims { exp, sub })
}

/// Check whether a token is expired at the given instant.
///
/// Returns `true` for a missing or empty token, a token without exactly three
/// segments, an undecodable payload, or a payload without `exp`. Otherwise
/// returns `true` iff `now` is strictly past `exp`, compared in milliseconds.
pub fn is_expired_at(token: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(token) = token else {
        return true;
    };

    match decode_claims(token) {
        Ok(claims) => now.timestamp_millis() > claims.exp.saturating_mul(1000),
        Err(e) => {
            debug!(error = %e, "Treating undecodable token as expired");
            true
        }
    }
}

/// Check whether a token is expired right now.
pub fn is_expired(token: Option<&str>) -> bool {
    is_expired_at(token, Utc::now())
}

/// Expiry time of a token, if it can be decoded.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token)
        .ok()
        .and_then(|claims| DateTime::from_timestamp(claims.exp, 0))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use chrono::Duration;

    /// Build an unsigned token around the given payload JSON
    pub(crate) fn token_with_payload(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        format!("{}.{}.signature", header, payload)
    }

    pub(crate) fn token_expiring_at(exp: DateTime<Utc>) -> String {
        token_with_payload(&format!(r#"{{"sub":"admin","exp":{}}}"#, exp.timestamp()))
    }

    #[test]
    fn test_missing_token_is_expired() {
        assert!(is_expired(None));
        assert!(is_expired(Some("")));
    }

    #[test]
    fn test_expiry_relative_to_now() {
        let now = Utc::now();
        let past = token_expiring_at(now - Duration::seconds(10));
        let future = token_expiring_at(now + Duration::seconds(10));

        assert!(is_expired_at(Some(&past), now));
        assert!(!is_expired_at(Some(&future), now));
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let exp = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let token = token_expiring_at(exp);

        assert!(!is_expired_at(Some(&token), exp));
        assert!(is_expired_at(Some(&token), exp + Duration::milliseconds(1)));
    }

    #[test]
    fn test_two_segments_is_expired() {
        let token = token_expiring_at(Utc::now() + Duration::hours(1));
        let truncated: String = token.rsplit_once('.').unwrap().0.to_string();

        assert!(is_expired(Some(&truncated)));
        assert_eq!(decode_claims(&truncated), Err(TokenError::Malformed(2)));
    }

    #[test]
    fn test_undecodable_payload_is_expired() {
        assert!(is_expired(Some("header.!!not-base64!!.signature")));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(is_expired(Some(&not_json)));
        assert!(matches!(decode_claims(&not_json), Err(TokenError::Payload(_))));
    }

    #[test]
    fn test_missing_or_unusable_exp_is_expired() {
        for payload in [
            r#"{"sub":"admin"}"#,
            r#"{"exp":null}"#,
            r#"{"exp":"1700000000"}"#,
            r#"{"exp":0}"#,
        ] {
            let token = token_with_payload(payload);
            assert!(is_expired(Some(&token)), "payload {} should be expired", payload);
            assert_eq!(decode_claims(&token), Err(TokenError::MissingExpiry));
        }
    }

    #[test]
    fn test_standard_alphabet_payload_is_accepted() {
        let exp = Utc::now() + Duration::hours(1);
        let payload = STANDARD.encode(format!(r#"{{"exp":{}}}"#, exp.timestamp()));
        let token = format!("h.{}.s", payload);

        assert!(!is_expired(Some(&token)));
    }

    #[test]
    fn test_decode_claims_reads_subject() {
        let exp = DateTime::from_timestamp(1_800_000_000, 0).unwrap();
        let claims = decode_claims(&token_expiring_at(exp)).unwrap();

        assert_eq!(claims.exp, 1_800_000_000);
        assert_eq!(claims.sub.as_deref(), Some("admin"));
        assert_eq!(expires_at(&token_expiring_at(exp)), Some(exp));
    }
}
