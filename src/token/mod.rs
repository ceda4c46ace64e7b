//! Signed playback tokens: issuing them on the server and requesting them from the client.

#[cfg(feature = "rest")]
mod http;
mod signer;

use std::{env, sync::Arc};

use futures::future::{self, BoxFuture};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

#[cfg(feature = "rest")]
pub use self::http::HttpTokenSource;
pub use self::signer::{PLAYBACK_AUDIENCE, PlaybackClaims, PlaybackSigner, TOKEN_TTL};

/// Environment variable holding the signing key id.
pub const SIGNING_KEY_ID_ENV: &str = "PLAYBACK_SIGNING_KEY_ID";
/// Environment variable holding the base64-encoded PEM private key.
pub const SIGNING_KEY_SECRET_ENV: &str = "PLAYBACK_SIGNING_KEY_SECRET";

/// Errors raised while issuing or fetching playback tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("playback id is missing")]
    MissingPlaybackId,
    #[error("signing secret is not valid base64")]
    InvalidEncoding(#[source] base64::DecodeError),
    #[error("signing key is not a valid RSA PEM")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign playback token")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token request failed: {0}")]
    Request(String),
}

/// Where the theater obtains a playback token for a playback id.
///
/// `Ok(None)` means playback proceeds unsigned.
pub trait PlaybackTokenSource: Send + Sync {
    fn request_playback_token(
        &self,
        playback_id: &str,
    ) -> BoxFuture<'static, Result<Option<String>, TokenError>>;
}

/// Issues tokens with the configured signing key, or none when signing is not configured.
#[derive(Debug, Clone, Default)]
pub struct TokenIssuer {
    signer: Option<Arc<PlaybackSigner>>,
}

impl TokenIssuer {
    /// Issuer that never signs.
    pub fn unsigned() -> Self {
        Self::default()
    }

    pub fn with_signer(signer: PlaybackSigner) -> Self {
        Self {
            signer: Some(Arc::new(signer)),
        }
    }

    /// Read the signing key from the environment; missing or invalid keys disable signing.
    pub fn from_env() -> Self {
        let key_id = env::var(SIGNING_KEY_ID_ENV).ok().filter(|v| !v.is_empty());
        let secret = env::var(SIGNING_KEY_SECRET_ENV)
            .ok()
            .filter(|v| !v.is_empty());

        let (Some(key_id), Some(secret)) = (key_id, secret) else {
            info!("playback signing keys not configured; tokens will be null");
            return Self::unsigned();
        };

        match PlaybackSigner::from_base64_pem(key_id, &secret) {
            Ok(signer) => {
                info!(key_id = signer.key_id(), "playback signing enabled");
                Self::with_signer(signer)
            }
            Err(err) => {
                warn!(error = %err, "invalid playback signing key; tokens will be null");
                Self::unsigned()
            }
        }
    }

    pub fn is_signing(&self) -> bool {
        self.signer.is_some()
    }

    /// Sign a token for `playback_id`, or `None` when signing is disabled.
    pub fn issue(
        &self,
        playback_id: &str,
        now: OffsetDateTime,
    ) -> Result<Option<String>, TokenError> {
        let playback_id = playback_id.trim();
        if playback_id.is_empty() {
            return Err(TokenError::MissingPlaybackId);
        }

        match &self.signer {
            Some(signer) => signer.sign(playback_id, now).map(Some),
            None => Ok(None),
        }
    }
}

impl PlaybackTokenSource for TokenIssuer {
    fn request_playback_token(
        &self,
        playback_id: &str,
    ) -> BoxFuture<'static, Result<Option<String>, TokenError>> {
        Box::pin(future::ready(
            self.issue(playback_id, OffsetDateTime::now_utc()),
        ))
    }
}
