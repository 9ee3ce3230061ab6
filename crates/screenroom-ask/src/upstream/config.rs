use std::time::Duration;

use crate::errors::ClientError;

/// Configuration for the answer-service client.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the answer service.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Budget for standard question answering.
    pub answer_timeout: Duration,
    /// Budget for deep, web-search-augmented answering.
    pub deep_answer_timeout: Duration,
    /// Character budget per synthetic delta in the non-streaming fallback.
    pub fallback_chunk_chars: usize,
    /// Pacing delay between synthetic fallback deltas.
    pub fallback_chunk_delay: Duration,
}

impl UpstreamConfig {
    /// Creates a config with the portal defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://answers.screenroom.dev".to_string(),
            answer_timeout: Duration::from_secs(45),
            deep_answer_timeout: Duration::from_secs(300),
            fallback_chunk_chars: 80,
            fallback_chunk_delay: Duration::from_millis(15),
        }
    }

    /// Builds a config from `SCREENROOM_ANSWERS_KEY` and, when set,
    /// `SCREENROOM_ANSWERS_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = std::env::var("SCREENROOM_ANSWERS_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ClientError::Config(
                "missing SCREENROOM_ANSWERS_KEY for the answer service".into(),
            ));
        }
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("SCREENROOM_ANSWERS_URL")
            && !base_url.trim().is_empty()
        {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Overrides the service base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the standard answer budget.
    pub fn answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = timeout;
        self
    }

    /// Overrides the deep-search answer budget.
    pub fn deep_answer_timeout(mut self, timeout: Duration) -> Self {
        self.deep_answer_timeout = timeout;
        self
    }

    pub(crate) fn ask_url(&self) -> String {
        format!("{}/v1/ask", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn timeout_for(&self, deep_search: bool) -> Duration {
        if deep_search {
            self.deep_answer_timeout
        } else {
            self.answer_timeout
        }
    }
}
