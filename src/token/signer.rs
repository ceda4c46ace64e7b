use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::TokenError;

/// Validity of an issued playback token.
pub const TOKEN_TTL: Duration = Duration::from_secs(4 * 60 * 60);
/// Audience expected by the video platform for playback tokens.
pub const PLAYBACK_AUDIENCE: &str = "v";

const ALGORITHM: Algorithm = Algorithm::RS256;

/// Claims of a signed playback token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackClaims {
    /// Playback id the token unlocks.
    pub sub: String,
    pub aud: String,
    /// Expiry as a Unix timestamp.
    pub exp: i64,
}

/// RS256 signer for playback ids.
#[derive(Clone)]
pub struct PlaybackSigner {
    key_id: String,
    key: EncodingKey,
}

impl std::fmt::Debug for PlaybackSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl PlaybackSigner {
    /// Build a signer from an RSA private key in PEM form.
    pub fn from_pem(key_id: impl Into<String>, pem: &[u8]) -> Result<Self, TokenError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(TokenError::InvalidKey)?;
        Ok(Self {
            key_id: key_id.into(),
            key,
        })
    }

    /// Build a signer from a base64-encoded PEM, as stored in the environment.
    pub fn from_base64_pem(key_id: impl Into<String>, secret: &str) -> Result<Self, TokenError> {
        let pem = STANDARD
            .decode(secret.trim())
            .map_err(TokenError::InvalidEncoding)?;
        Self::from_pem(key_id, &pem)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a token for `playback_id` expiring [`TOKEN_TTL`] after `now`.
    pub fn sign(&self, playback_id: &str, now: OffsetDateTime) -> Result<String, TokenError> {
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.key_id.clone());

        let claims = PlaybackClaims {
            sub: playback_id.to_string(),
            aud: PLAYBACK_AUDIENCE.to_string(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
        };

        encode(&header, &claims, &self.key).map_err(TokenError::Signing)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
    use time::macros::datetime;

    use super::*;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/playback_signing_key.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/playback_signing_key.pub.pem");

    #[test]
    fn signed_token_carries_kid_subject_audience_and_expiry() {
        let signer = PlaybackSigner::from_base64_pem("key-1", &STANDARD.encode(PRIVATE_PEM)).unwrap();
        let now = OffsetDateTime::now_utc();
        let token = signer.sign("playback-abc", now).unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("key-1"));

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[PLAYBACK_AUDIENCE]);
        let decoded = decode::<PlaybackClaims>(
            &token,
            &DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, "playback-abc");
        assert_eq!(decoded.claims.exp, now.unix_timestamp() + 4 * 3_600);
    }

    #[test]
    fn expiry_is_four_hours_after_now() {
        let signer = PlaybackSigner::from_pem("key-1", PRIVATE_PEM.as_bytes()).unwrap();
        let token = signer
            .sign("playback-abc", datetime!(2025-06-14 21:00 UTC))
            .unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[PLAYBACK_AUDIENCE]);
        validation.validate_exp = false;
        let decoded = decode::<PlaybackClaims>(
            &token,
            &DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(
            decoded.claims.exp,
            datetime!(2025-06-15 01:00 UTC).unix_timestamp()
        );
    }

    #[test]
    fn rejects_garbage_secrets() {
        assert!(matches!(
            PlaybackSigner::from_base64_pem("key-1", "not base64!"),
            Err(TokenError::InvalidEncoding(_))
        ));
        assert!(matches!(
            PlaybackSigner::from_base64_pem("key-1", &STANDARD.encode("not a pem")),
            Err(TokenError::InvalidKey(_))
        ));
    }
}
