use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{PlaybackTokenSource, TokenError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    playback_id: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// Requests playback tokens from a remote `POST /playback-token` endpoint.
#[derive(Clone)]
pub struct HttpTokenSource {
    client: Client,
    endpoint: Arc<str>,
}

impl HttpTokenSource {
    /// `base_url` is the service root; the endpoint path is appended.
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: Arc::from(format!("{}/playback-token", base_url.trim_end_matches('/'))),
        }
    }
}

impl PlaybackTokenSource for HttpTokenSource {
    fn request_playback_token(
        &self,
        playback_id: &str,
    ) -> BoxFuture<'static, Result<Option<String>, TokenError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let playback_id = playback_id.to_string();
        Box::pin(async move {
            let response = client
                .post(endpoint.as_ref())
                .json(&TokenRequest {
                    playback_id: &playback_id,
                })
                .send()
                .await
                .map_err(|err| TokenError::Request(err.to_string()))?;

            if !response.status().is_success() {
                return Err(TokenError::Request(format!(
                    "token endpoint answered {}",
                    response.status()
                )));
            }

            let body = response
                .json::<TokenResponse>()
                .await
                .map_err(|err| TokenError::Request(err.to_string()))?;
            Ok(body.token)
        })
    }
}
