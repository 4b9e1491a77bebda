//! Wire-level client trait and error types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::{Usage, Vendor};
use crate::prepare::PreparedMessage;

/// Errors raised by vendor wire clients and the adapter layer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{vendor} error ({status}): {message}")]
    Api {
        vendor: Vendor,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Every attachment in the call was rejected or discarded for this vendor.
    #[error("Attachments rejected: {0}")]
    Attachments(String),
}

/// Text fragments vendors use when a request exceeds a token or size ceiling.
const TOKEN_LIMIT_SIGNATURES: &[&str] = &[
    "request too large",
    "request_too_large",
    "payload too large",
    "file too large",
    "too large",
    "too many tokens",
    "token limit",
    "tokens exceed",
    "maximum context length",
    "context_length_exceeded",
    "context window",
    "prompt is too long",
    "exceeds the maximum",
    "input token count",
];

/// Reasons a specific model cannot serve a request on an otherwise healthy vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelIssue {
    OrganizationVerification,
    ModelNotFound,
    StreamingUnsupported,
}

impl ModelIssue {
    pub fn describe(&self) -> &'static str {
        match self {
            ModelIssue::OrganizationVerification => "requires organization verification",
            ModelIssue::ModelNotFound => "is not available",
            ModelIssue::StreamingUnsupported => "does not support streaming",
        }
    }
}

impl ClientError {
    /// Whether the failure belongs to the token/size-limit class.
    pub fn is_token_limit(&self) -> bool {
        if let ClientError::Api { status: 413, .. } = self {
            return true;
        }
        let text = self.to_string().to_lowercase();
        TOKEN_LIMIT_SIGNATURES.iter().any(|sig| text.contains(sig))
    }

    /// Classify a model-availability failure, if this is one.
    pub fn model_issue(&self) -> Option<ModelIssue> {
        let ClientError::Api {
            status,
            code,
            message,
            ..
        } = self
        else {
            return None;
        };
        let message = message.to_lowercase();
        let code = code.as_deref().unwrap_or_default().to_lowercase();

        if message.contains("organization must be verified")
            || message.contains("verify organization")
            || message.contains("organization verification")
        {
            return Some(ModelIssue::OrganizationVerification);
        }
        if message.contains("stream")
            && (message.contains("not supported")
                || message.contains("unsupported")
                || message.contains("does not support"))
        {
            return Some(ModelIssue::StreamingUnsupported);
        }
        if code == "model_not_found"
            || (message.contains("model")
                && (message.contains("not found") || message.contains("does not exist")))
            || (*status == 404 && message.contains("model"))
        {
            return Some(ModelIssue::ModelNotFound);
        }
        None
    }
}

/// A vendor reply translated back to the vendor-agnostic shape.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Ordered text deltas from a vendor stream.
pub type DeltaStream = BoxStream<'static, Result<String, ClientError>>;

/// Wire-level client for one vendor.
///
/// Implementations translate already prepared messages into the vendor's
/// request shape, issue the call and translate the reply back. Attachment
/// handling and fallback policy live above this trait, in
/// [`ProviderAdapter`](crate::adapter::ProviderAdapter).
#[async_trait]
pub trait Client: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Model used when the caller names none.
    fn default_model(&self) -> &str;

    /// Known-stable model substituted when the requested one is unavailable.
    fn stable_model(&self) -> &str;

    /// Blocking completion.
    async fn request(
        &self,
        messages: &[PreparedMessage],
        model: &str,
    ) -> Result<Response, ClientError>;

    /// Streaming completion. Errors before the stream is returned mean no
    /// output was produced.
    async fn request_stream(
        &self,
        messages: &[PreparedMessage],
        model: &str,
    ) -> Result<DeltaStream, ClientError>;
}
