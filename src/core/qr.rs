//! QR token codec
//!
//! Binds a ticket identity to an opaque, tamper-evident string that can be printed as a
//! QR code. A version 1 token looks like
//!
//! ```text
//! TKT1.<base64url(ticket_id:issued_at_millis)>.<hex hmac-sha256>
//! ```
//!
//! The HMAC covers the version marker and the payload. Tokens only carry data that never
//! changes after issuance; whether a ticket is admissible is always decided by looking up
//! its current state. Decoding is driven by untrusted scanner input, so every failure is
//! a [`TokenError`] value and nothing here panics.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use qrcode::QrCode;
use qrcode::render::svg;
use ring::hmac;
use thiserror::Error;

use crate::errors::{Error, Result};

/// Token format written by [`QrCodec::issue`]
pub const CURRENT_VERSION: u32 = 1;

const TOKEN_PREFIX: &str = "TKT";
const SEPARATOR: char = '.';

/// Identity carried by a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    /// Ticket the token was minted for
    pub ticket_id: i64,
    /// Server time at issuance, millisecond precision
    pub issued_at: DateTime<Utc>,
    /// Format version
    pub version: u32,
}

/// Why a scanned string is not a valid token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not shaped like a token at all
    #[error("token is not structurally valid")]
    Malformed,
    /// Shaped like a token from a format this build cannot read
    #[error("unsupported token version {0}")]
    UnsupportedVersion(u32),
    /// Structure is fine but the signature does not match
    #[error("token signature mismatch")]
    BadSignature,
}

/// Signs and verifies ticket tokens. Pure: never touches the ledger store.
#[derive(Clone)]
pub struct QrCodec {
    key: hmac::Key,
}

impl std::fmt::Debug for QrCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrCodec").finish_non_exhaustive()
    }
}

impl QrCodec {
    /// Creates a codec keyed with the given secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Mints a token in the current format.
    #[must_use]
    pub fn issue(&self, ticket_id: i64, issued_at: DateTime<Utc>) -> String {
        self.encode_v1(ticket_id, issued_at)
    }

    /// Encodes claims in the format named by `claims.version`.
    pub fn encode(&self, claims: &TokenClaims) -> std::result::Result<String, TokenError> {
        match claims.version {
            1 => Ok(self.encode_v1(claims.ticket_id, claims.issued_at)),
            other => Err(TokenError::UnsupportedVersion(other)),
        }
    }

    fn encode_v1(&self, ticket_id: i64, issued_at: DateTime<Utc>) -> String {
        let payload = format!("{ticket_id}:{}", issued_at.timestamp_millis());
        let signed_part = format!(
            "{TOKEN_PREFIX}1{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes())
        );
        let tag = hmac::sign(&self.key, signed_part.as_bytes());
        format!("{signed_part}{SEPARATOR}{}", hex::encode(tag.as_ref()))
    }

    /// Parses and verifies a scanned token.
    pub fn decode(&self, token: &str) -> std::result::Result<TokenClaims, TokenError> {
        let token = token.trim();
        let mut parts = token.split(SEPARATOR);
        let (Some(marker), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let version = parse_version(marker)?;
        if version != 1 {
            return Err(TokenError::UnsupportedVersion(version));
        }

        let tag = hex::decode(signature).map_err(|_| TokenError::Malformed)?;
        let signed_len = marker.len() + 1 + payload.len();
        hmac::verify(&self.key, &token.as_bytes()[..signed_len], &tag)
            .map_err(|_| TokenError::BadSignature)?;

        let (ticket_id, issued_at) = parse_v1_payload(payload)?;
        Ok(TokenClaims {
            ticket_id,
            issued_at,
            version,
        })
    }
}

fn parse_version(marker: &str) -> std::result::Result<u32, TokenError> {
    let digits = marker
        .strip_prefix(TOKEN_PREFIX)
        .ok_or(TokenError::Malformed)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::Malformed);
    }
    digits.parse().map_err(|_| TokenError::Malformed)
}

fn parse_v1_payload(payload: &str) -> std::result::Result<(i64, DateTime<Utc>), TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let text = std::str::from_utf8(&bytes).map_err(|_| TokenError::Malformed)?;
    let (id, millis) = text.split_once(':').ok_or(TokenError::Malformed)?;
    let ticket_id: i64 = id.parse().map_err(|_| TokenError::Malformed)?;
    let millis: i64 = millis.parse().map_err(|_| TokenError::Malformed)?;
    let issued_at = DateTime::from_timestamp_millis(millis).ok_or(TokenError::Malformed)?;
    Ok((ticket_id, issued_at))
}

/// Renders a token as an SVG QR image for e-tickets and print.
pub fn render_svg(token: &str) -> Result<String> {
    let code = QrCode::new(token.as_bytes())
        .map_err(|e| Error::malformed(format!("cannot render QR code: {e}")))?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(200, 200)
        .build())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn codec() -> QrCodec {
        QrCodec::new(b"unit-test-key")
    }

    fn issued_at() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_760_000_000_123).unwrap()
    }

    #[test]
    fn test_issue_and_decode() {
        let token = codec().issue(42, issued_at());
        assert!(token.starts_with("TKT1."));

        let claims = codec().decode(&token).unwrap();
        assert_eq!(claims.ticket_id, 42);
        assert_eq!(claims.issued_at, issued_at());
        assert_eq!(claims.version, CURRENT_VERSION);
    }

    #[test]
    fn test_distinct_tickets_get_distinct_tokens() {
        let c = codec();
        assert_ne!(c.issue(1, issued_at()), c.issue(2, issued_at()));
    }

    #[test]
    fn test_encode_rejects_unknown_version() {
        let claims = TokenClaims {
            ticket_id: 1,
            issued_at: issued_at(),
            version: 7,
        };
        assert_eq!(
            codec().encode(&claims),
            Err(TokenError::UnsupportedVersion(7))
        );
    }

    #[test]
    fn test_decode_garbage() {
        let c = codec();
        for input in [
            "",
            "hello",
            "TKT1",
            "TKT1..",
            "TKT.abc.def",
            "TKTx.abc.def",
            "a.b.c.d",
            "TKT1.!!!.00",
            "TKT-12345678-ABCDEFGH-XYZ-123",
        ] {
            assert!(c.decode(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_decode_future_version() {
        let token = codec().issue(5, issued_at()).replacen("TKT1", "TKT2", 1);
        assert_eq!(codec().decode(&token), Err(TokenError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let token = codec().issue(5, issued_at());
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = URL_SAFE_NO_PAD.encode(b"6:1760000000123");
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert_eq!(codec().decode(&forged), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_other_key_fails_signature() {
        let token = QrCodec::new(b"another-key").issue(5, issued_at());
        assert_eq!(codec().decode(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let token = codec().issue(9, issued_at());
        let claims = codec().decode(&format!("  {token}\n")).unwrap();
        assert_eq!(claims.ticket_id, 9);
    }

    #[test]
    fn test_render_svg() {
        let token = codec().issue(9, issued_at());
        let svg = render_svg(&token).unwrap();
        assert!(svg.contains("<svg"));
    }
}
