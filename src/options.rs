//! Generic options structures for model and transport configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Model behavior parameters plus provider-specific model configuration.
///
/// `model` is the hinted default for the vendor; the orchestrator may pass a
/// different model per call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelOptions<T> {
    /// Model identifier (e.g., "gpt-4o", "claude-sonnet-4-20250514")
    pub model: Option<String>,

    /// Temperature for sampling (0.0 - 2.0)
    pub temperature: Option<f32>,

    /// Top-p (nucleus) sampling parameter
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Provider-specific model options
    pub provider: T,
}

impl<T> ModelOptions<T> {
    pub fn new(provider: T) -> Self {
        Self {
            model: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            provider,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Transport configuration shared by every vendor plus a provider-specific part.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions<T> {
    /// Request timeout (applies to all transports)
    pub timeout: Option<Duration>,

    pub provider: T,
}

impl<T> TransportOptions<T> {
    pub fn new(provider: T) -> Self {
        Self {
            timeout: None,
            provider,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP-specific transport options.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    pub api_key: Option<SecretString>,

    /// Base URL for API endpoints; each vendor falls back to its public endpoint.
    pub base_url: Option<String>,

    pub proxy: Option<String>,

    pub extra_headers: Option<HashMap<String, String>>,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: None,
            proxy: None,
            extra_headers: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

/// OpenAI-specific model options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiModel {
    /// Forwarded as the `user` field for abuse monitoring.
    pub user: Option<String>,
}

/// Anthropic-specific model options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnthropicModel {
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Gemini-specific model options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiModel {
    pub top_k: Option<u32>,
}
