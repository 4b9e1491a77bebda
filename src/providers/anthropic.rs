//! Anthropic Messages API client implementation.
//!
//! See: <https://docs.anthropic.com/en/api/messages>

use async_trait::async_trait;
use futures::StreamExt;
use itertools::Itertools;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientError, DeltaStream, Response};
use crate::http::{add_extra_headers, build_http_client, send_json};
use crate::model::{Role, Usage, Vendor};
use crate::options::{AnthropicModel, HttpTransport, ModelOptions, TransportOptions};
use crate::prepare::{ContentPart, InlineKind, PreparedMessage};
use crate::sse::SSEResponseExt;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const STABLE_MODEL: &str = "claude-3-5-haiku-20241022";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic client using HTTP transport.
pub struct AnthropicClient {
    model_options: ModelOptions<AnthropicModel>,
    transport_options: TransportOptions<HttpTransport>,
}

impl AnthropicClient {
    pub fn new(
        model_options: ModelOptions<AnthropicModel>,
        transport_options: TransportOptions<HttpTransport>,
    ) -> Self {
        Self {
            model_options,
            transport_options,
        }
    }

    fn build_request(&self) -> Result<reqwest::RequestBuilder, ClientError> {
        let api_key = self
            .transport_options
            .provider
            .api_key
            .as_ref()
            .ok_or_else(|| ClientError::Config("API key is required".to_string()))?;

        let api_base = self
            .transport_options
            .provider
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE);

        let http_client = build_http_client(&self.transport_options)?;
        let req = http_client
            .post(format!("{api_base}/v1/messages"))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json");

        Ok(add_extra_headers(req, &self.transport_options.provider.extra_headers))
    }

    fn process_stream(response: reqwest::Response) -> DeltaStream {
        response
            .sse()
            .filter_map(|result| async move {
                let event = match result {
                    Ok(line) => serde_json::from_str::<AnthropicStreamEvent>(&line),
                    Err(e) => return Some(Err(e)),
                };
                match event {
                    Ok(AnthropicStreamEvent::ContentBlockDelta {
                        delta: AnthropicDelta::TextDelta { text },
                    }) => Some(Ok(text)),
                    Ok(AnthropicStreamEvent::Error { error }) => Some(Err(ClientError::Stream(
                        format!("{}: {}", error.error_type, error.message),
                    ))),
                    Ok(_) => None,
                    Err(e) => Some(Err(ClientError::Parse(e))),
                }
            })
            .boxed()
    }

    /// Handle Anthropic error responses.
    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        match serde_json::from_str::<AnthropicErrorResponse>(body) {
            Ok(error_resp) => ClientError::Api {
                vendor: Vendor::Anthropic,
                status: status.as_u16(),
                code: Some(error_resp.error.error_type),
                message: error_resp.error.message,
            },
            Err(_) => ClientError::Api {
                vendor: Vendor::Anthropic,
                status: status.as_u16(),
                code: None,
                message: body.to_string(),
            },
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new(
            ModelOptions::new(AnthropicModel::default()),
            TransportOptions::new(HttpTransport::default()),
        )
    }
}

#[async_trait]
impl Client for AnthropicClient {
    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    fn default_model(&self) -> &str {
        self.model_options.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn stable_model(&self) -> &str {
        STABLE_MODEL
    }

    async fn request(
        &self,
        messages: &[PreparedMessage],
        model: &str,
    ) -> Result<Response, ClientError> {
        let body = AnthropicRequest::new(messages, &self.model_options, model, false);
        let response = send_json(self.build_request()?, &body, Self::handle_error_response).await?;
        let anthropic_response: AnthropicResponse = response.json().await?;
        Ok(anthropic_response.into())
    }

    async fn request_stream(
        &self,
        messages: &[PreparedMessage],
        model: &str,
    ) -> Result<DeltaStream, ClientError> {
        let body = AnthropicRequest::new(messages, &self.model_options, model, true);
        let response = send_json(self.build_request()?, &body, Self::handle_error_response).await?;
        Ok(Self::process_stream(response))
    }
}

impl AnthropicRequest {
    fn new(
        messages_in: &[PreparedMessage],
        model_options: &ModelOptions<AnthropicModel>,
        model: &str,
        stream: bool,
    ) -> Self {
        let system = messages_in
            .iter()
            .filter(|m| m.role == Role::System)
            .map(PreparedMessage::joined_text)
            .join("\n\n");

        let mut messages = Vec::new();
        for msg in messages_in.iter().filter(|m| m.role != Role::System) {
            let content: Vec<AnthropicContentBlock> = msg
                .parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => AnthropicContentBlock::Text { text: text.clone() },
                    ContentPart::Inline {
                        mime_type,
                        data,
                        kind,
                        ..
                    } => {
                        let source = AnthropicSource {
                            source_type: "base64",
                            media_type: mime_type.clone(),
                            data: data.clone(),
                        };
                        match kind {
                            InlineKind::Image => AnthropicContentBlock::Image { source },
                            InlineKind::Document => AnthropicContentBlock::Document { source },
                        }
                    }
                })
                .collect();

            if !content.is_empty() {
                messages.push(AnthropicMessage {
                    role: if msg.role == Role::Assistant {
                        "assistant"
                    } else {
                        "user"
                    },
                    content,
                });
            }
        }

        AnthropicRequest {
            model: model.to_string(),
            messages,
            max_tokens: model_options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: Some(system).filter(|s| !s.is_empty()),
            temperature: model_options.temperature,
            top_p: model_options.top_p,
            top_k: model_options.provider.top_k,
            stop_sequences: model_options.provider.stop_sequences.clone(),
            stream: stream.then_some(true),
        }
    }
}

impl From<AnthropicResponse> for Response {
    fn from(resp: AnthropicResponse) -> Self {
        let content = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .join("");

        Response {
            content,
            usage: Some(Usage {
                prompt_tokens: Some(resp.usage.input_tokens),
                completion_tokens: Some(resp.usage.output_tokens),
            }),
        }
    }
}

// --- Request Types ---

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    Image { source: AnthropicSource },
    Document { source: AnthropicSource },
}

#[derive(Debug, Serialize)]
struct AnthropicSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

// --- Response Types ---

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

// --- SSE Event Types ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    ContentBlockDelta { delta: AnthropicDelta },
    Error { error: AnthropicError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new(
            ModelOptions::new(AnthropicModel::default()),
            TransportOptions::new(HttpTransport::new("ak-test").with_base_url(server.uri())),
        )
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![
            PreparedMessage::text(Role::System, "you are terse"),
            PreparedMessage {
                role: Role::User,
                parts: vec![
                    ContentPart::Text("read this".into()),
                    ContentPart::Inline {
                        mime_type: "application/pdf".into(),
                        data: "JVBERg==".into(),
                        name: "a.pdf".into(),
                        kind: InlineKind::Document,
                    },
                ],
            },
        ];
        let body = AnthropicRequest::new(
            &messages,
            &ModelOptions::new(AnthropicModel::default()),
            DEFAULT_MODEL,
            true,
        );
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["system"], "you are terse");
        assert_eq!(value["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(value["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["messages"][0]["content"][1]["type"], "document");
        assert_eq!(value["messages"][0]["content"][1]["source"]["media_type"], "application/pdf");
        assert_eq!(value["stream"], true);
    }

    #[tokio::test]
    async fn test_request_sends_version_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": DEFAULT_MODEL,
                "content": [{"type": "text", "text": "Hi!"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 1}
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .request(&[PreparedMessage::text(Role::User, "hello")], DEFAULT_MODEL)
            .await
            .unwrap();
        assert_eq!(response.content, "Hi!");
        assert_eq!(response.usage.and_then(|u| u.total()), Some(4));
    }

    #[tokio::test]
    async fn test_error_carries_type_as_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_json(json!({
                "type": "error",
                "error": {"type": "request_too_large", "message": "Request exceeds the maximum size"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .request(&[PreparedMessage::text(Role::User, "hello")], DEFAULT_MODEL)
            .await
            .unwrap_err();
        assert!(err.is_token_limit());
        assert_eq!(
            err.to_string(),
            "anthropic error (413): Request exceeds the maximum size"
        );
    }

    #[tokio::test]
    async fn test_stream_text_deltas_and_error_event() {
        let server = MockServer::start().await;
        let sse = "event: message_start\n\
                   data: {\"type\":\"message_start\",\"message\":{}}\n\n\
                   event: content_block_delta\n\
                   data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bon\"}}\n\n\
                   event: ping\n\
                   data: {\"type\":\"ping\"}\n\n\
                   event: content_block_delta\n\
                   data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"jour\"}}\n\n\
                   event: error\n\
                   data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let mut stream = client(&server)
            .request_stream(&[PreparedMessage::text(Role::User, "hello")], DEFAULT_MODEL)
            .await
            .unwrap();
        assert_eq!(stream.try_next().await.unwrap().as_deref(), Some("Bon"));
        assert_eq!(stream.try_next().await.unwrap().as_deref(), Some("jour"));
        assert!(matches!(stream.try_next().await, Err(ClientError::Stream(m)) if m.contains("Overloaded")));
    }
}
