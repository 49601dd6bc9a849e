//! Self-contained, expiring capability tokens for a single document.
//!
//! Format: `base64url(payload_json) "." base64url(HMAC-SHA256(secret, payload_segment))`.
//! Nothing is stored server-side; the expiry and the secret are the only
//! controls. Rotating the secret (and dropping the previous one) revokes every
//! outstanding link at once.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::validation::documents::{validate_document_id, validate_valid_days};

type HmacSha256 = Hmac<Sha256>;

/// Tokens longer than this are rejected before any decoding.
const MAX_TOKEN_LEN: usize = 1024;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SharePayload {
    pub document_id: String,
    /// Epoch milliseconds; the token is valid up to and including this instant.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedShareToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct ShareTokenService {
    secret: Zeroizing<Vec<u8>>,
    previous_secret: Option<Zeroizing<Vec<u8>>>,
    clock: Arc<dyn Clock>,
    default_days: u32,
    max_days: u32,
}

impl ShareTokenService {
    pub fn new(
        secret: Zeroizing<Vec<u8>>,
        previous_secret: Option<Zeroizing<Vec<u8>>>,
        clock: Arc<dyn Clock>,
        default_days: u32,
        max_days: u32,
    ) -> Self {
        Self {
            secret,
            previous_secret,
            clock,
            default_days,
            max_days,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.share_token_secret.clone(),
            config.share_token_previous_secret.clone(),
            clock,
            config.share_token_default_days,
            config.share_token_max_days,
        )
    }

    pub fn default_days(&self) -> u32 {
        self.default_days
    }

    /// Issues a token for `document_id`, valid for `valid_days` (or the
    /// configured default).
    pub fn issue(&self, document_id: &str, valid_days: Option<u32>) -> Result<IssuedShareToken> {
        validate_document_id(document_id)?;
        let valid_days = valid_days.unwrap_or(self.default_days);
        validate_valid_days(valid_days, self.max_days)?;

        let expires_at = self.clock.now().timestamp_millis() + i64::from(valid_days) * MILLIS_PER_DAY;
        let payload = SharePayload {
            document_id: document_id.to_string(),
            expires_at,
        };

        let json = sonic_rs::to_vec(&payload)
            .map_err(|e| AppError::Internal(format!("Failed to encode share payload: {}", e)))?;
        let payload_segment = URL_SAFE_NO_PAD.encode(json);
        let tag = sign_segment(&self.secret, &payload_segment)?;

        tracing::info!(
            "🔗 Share token issued for {} ({} days)",
            document_id,
            valid_days
        );

        Ok(IssuedShareToken {
            token: format!("{}.{}", payload_segment, URL_SAFE_NO_PAD.encode(tag)),
            expires_at: DateTime::from_timestamp_millis(expires_at)
                .ok_or_else(|| AppError::Internal("Share token expiry out of range".to_string()))?,
        })
    }

    /// Whether `token` currently grants access to `expected_document_id`.
    ///
    /// Never fails; every kind of rejection collapses to `false`.
    pub fn validate(&self, token: &str, expected_document_id: &str) -> bool {
        match self.inspect(token, expected_document_id) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Share token rejected: {}", e);
                false
            }
        }
    }

    /// Like [`validate`](Self::validate) but says why a token was rejected.
    /// For logs and tests only; callers must not forward the distinction.
    pub fn inspect(&self, token: &str, expected_document_id: &str) -> Result<SharePayload> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(AppError::TokenMalformed);
        }

        let (payload_segment, tag_segment) =
            token.split_once('.').ok_or(AppError::TokenMalformed)?;
        if tag_segment.contains('.') || payload_segment.is_empty() {
            return Err(AppError::TokenMalformed);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(tag_segment)
            .map_err(|_| AppError::TokenMalformed)?;

        let authentic = self.tag_matches(&self.secret, payload_segment, &tag)?
            || match &self.previous_secret {
                Some(previous) => self.tag_matches(previous, payload_segment, &tag)?,
                None => false,
            };
        if !authentic {
            return Err(AppError::TokenSignatureMismatch);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload_segment)
            .map_err(|_| AppError::TokenMalformed)?;
        let payload: SharePayload =
            sonic_rs::from_slice(&json).map_err(|_| AppError::TokenMalformed)?;

        if !bool::from(
            payload
                .document_id
                .as_bytes()
                .ct_eq(expected_document_id.as_bytes()),
        ) {
            return Err(AppError::TokenSignatureMismatch);
        }

        if self.clock.now().timestamp_millis() > payload.expires_at {
            return Err(AppError::TokenExpired);
        }

        Ok(payload)
    }

    fn tag_matches(&self, secret: &[u8], payload_segment: &str, tag: &[u8]) -> Result<bool> {
        let expected = sign_segment(secret, payload_segment)?;
        Ok(expected.as_slice().ct_eq(tag).into())
    }
}

fn sign_segment(secret: &[u8], payload_segment: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("Invalid share token secret: {}", e)))?;
    mac.update(payload_segment.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::epoch;
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(86_400);

    fn secret(byte: u8) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(vec![byte; 32])
    }

    fn service(clock: Arc<ManualClock>) -> ShareTokenService {
        ShareTokenService::new(secret(1), None, clock, 7, 30)
    }

    #[test]
    fn issued_token_validates_immediately() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock);

        let issued = tokens.issue("doc-9", Some(7)).unwrap();
        assert!(tokens.validate(&issued.token, "doc-9"));
        assert_eq!(issued.expires_at, epoch() + chrono::Duration::days(7));
    }

    #[test]
    fn valid_on_day_six_expired_on_day_eight() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock.clone());
        let issued = tokens.issue("doc-9", Some(7)).unwrap();

        clock.advance(DAY * 6);
        assert!(tokens.validate(&issued.token, "doc-9"));

        clock.advance(DAY * 2);
        assert!(!tokens.validate(&issued.token, "doc-9"));
        assert!(matches!(
            tokens.inspect(&issued.token, "doc-9"),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn expiry_instant_itself_is_still_valid() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock.clone());
        let issued = tokens.issue("doc-9", Some(1)).unwrap();

        clock.advance(DAY);
        assert!(tokens.validate(&issued.token, "doc-9"));

        clock.advance(Duration::from_millis(1));
        assert!(!tokens.validate(&issued.token, "doc-9"));
    }

    #[test]
    fn one_flipped_payload_bit_is_rejected() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock);
        let issued = tokens.issue("doc-9", Some(7)).unwrap();
        let (payload, tag) = issued.token.split_once('.').unwrap();

        let mut json = URL_SAFE_NO_PAD.decode(payload).unwrap();
        for byte in 0..json.len() {
            for bit in 0..8 {
                json[byte] ^= 1 << bit;
                let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(&json), tag);
                assert!(!tokens.validate(&forged, "doc-9"));
                json[byte] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn token_is_bound_to_its_document() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock);
        let issued = tokens.issue("doc-9", None).unwrap();

        assert!(matches!(
            tokens.inspect(&issued.token, "doc-10"),
            Err(AppError::TokenSignatureMismatch)
        ));
    }

    #[test]
    fn malformed_tokens_fail_closed() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock);

        let oversized = "a".repeat(2000);
        for token in ["", ".", "abc", "a.b.c", "!!!.???", oversized.as_str()] {
            assert!(!tokens.validate(token, "doc-9"), "{:?}", token);
        }

        let tag = URL_SAFE_NO_PAD.encode(sign_segment(&secret(1), "bm90IGpzb24").unwrap());
        assert!(matches!(
            tokens.inspect(&format!("bm90IGpzb24.{}", tag), "doc-9"),
            Err(AppError::TokenMalformed)
        ));
    }

    #[test]
    fn previous_secret_still_validates_during_rotation() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let old = ShareTokenService::new(secret(1), None, clock.clone(), 7, 30);
        let issued = old.issue("doc-9", None).unwrap();

        let rotated = ShareTokenService::new(secret(2), Some(secret(1)), clock.clone(), 7, 30);
        assert!(rotated.validate(&issued.token, "doc-9"));

        let revoked = ShareTokenService::new(secret(2), None, clock, 7, 30);
        assert!(matches!(
            revoked.inspect(&issued.token, "doc-9"),
            Err(AppError::TokenSignatureMismatch)
        ));
    }

    #[test]
    fn validity_window_is_capped() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let tokens = service(clock);

        assert!(tokens.issue("doc-9", Some(0)).is_err());
        assert!(tokens.issue("doc-9", Some(31)).is_err());
        assert!(tokens.issue("../doc-9", Some(1)).is_err());
    }
}
