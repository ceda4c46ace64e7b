use super::error::{RestDaoError, RestResult};

/// Runtime configuration describing how to reach the REST (PostgREST-style) database API.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl RestConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Attach the API key sent as both `apikey` and bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> RestResult<Self> {
        let base_url = std::env::var("REST_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(RestDaoError::MissingEnvVar {
                var: "REST_BASE_URL",
            })?;

        let mut config = Self::new(base_url);
        if let Ok(api_key) = std::env::var("REST_API_KEY") {
            config = config.with_api_key(api_key);
        }

        Ok(config)
    }
}
