//! Google Gemini API client implementation.
//!
//! See: <https://ai.google.dev/api/rest>

use async_trait::async_trait;
use futures::StreamExt;
use itertools::Itertools;
use nonempty::NonEmpty;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientError, DeltaStream, Response};
use crate::http::{add_extra_headers, build_http_client, send_json};
use crate::model::{Role, Usage, Vendor};
use crate::options::{GeminiModel, HttpTransport, ModelOptions, TransportOptions};
use crate::prepare::{ContentPart, PreparedMessage};
use crate::sse::SSEResponseExt;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const STABLE_MODEL: &str = "gemini-2.0-flash";

/// Gemini client using HTTP transport.
pub struct GeminiClient {
    model_options: ModelOptions<GeminiModel>,
    transport_options: TransportOptions<HttpTransport>,
}

impl GeminiClient {
    pub fn new(
        model_options: ModelOptions<GeminiModel>,
        transport_options: TransportOptions<HttpTransport>,
    ) -> Self {
        Self {
            model_options,
            transport_options,
        }
    }

    /// `action` is `generateContent` or `streamGenerateContent?alt=sse`.
    fn build_request(&self, model: &str, action: &str) -> Result<reqwest::RequestBuilder, ClientError> {
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

        let separator = if action.contains('?') { '&' } else { '?' };
        let url = format!(
            "{api_base}/v1beta/models/{model}:{action}{separator}key={}",
            api_key.expose_secret()
        );

        let http_client = build_http_client(&self.transport_options)?;
        let req = http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/json");

        Ok(add_extra_headers(req, &self.transport_options.provider.extra_headers))
    }

    fn process_stream(response: reqwest::Response) -> DeltaStream {
        response
            .sse()
            .filter_map(|result| async move {
                let event = match result {
                    Ok(line) => serde_json::from_str::<GeminiStreamEvent>(&line),
                    Err(e) => return Some(Err(e)),
                };
                match event {
                    Ok(GeminiStreamEvent::Error { error }) => Some(Err(ClientError::Stream(
                        format!("{}: {}", error.status.unwrap_or_default(), error.message),
                    ))),
                    Ok(GeminiStreamEvent::Chunk(chunk)) => {
                        let text = chunk
                            .candidates
                            .into_iter()
                            .filter_map(|c| c.content)
                            .flat_map(|c| c.parts)
                            .filter(|p| !p.thought.unwrap_or_default())
                            .filter_map(|p| p.text)
                            .join("");
                        (!text.is_empty()).then_some(Ok(text))
                    }
                    Err(e) => Some(Err(ClientError::Parse(e))),
                }
            })
            .boxed()
    }

    /// Handle Gemini error responses.
    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        match serde_json::from_str::<GeminiErrorResponse>(body) {
            Ok(error_resp) => ClientError::Api {
                vendor: Vendor::Gemini,
                status: status.as_u16(),
                code: error_resp.error.status,
                message: error_resp.error.message,
            },
            Err(_) => ClientError::Api {
                vendor: Vendor::Gemini,
                status: status.as_u16(),
                code: None,
                message: body.to_string(),
            },
        }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new(
            ModelOptions::new(GeminiModel::default()),
            TransportOptions::new(HttpTransport::default()),
        )
    }
}

#[async_trait]
impl Client for GeminiClient {
    fn vendor(&self) -> Vendor {
        Vendor::Gemini
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
        let body = GeminiRequest::new(messages, &self.model_options);
        let req = self.build_request(model, "generateContent")?;
        let response = send_json(req, &body, Self::handle_error_response).await?;
        let gemini_response: GeminiResponse = response.json().await?;
        Response::try_from(gemini_response)
    }

    async fn request_stream(
        &self,
        messages: &[PreparedMessage],
        model: &str,
    ) -> Result<DeltaStream, ClientError> {
        let body = GeminiRequest::new(messages, &self.model_options);
        let req = self.build_request(model, "streamGenerateContent?alt=sse")?;
        let response = send_json(req, &body, Self::handle_error_response).await?;
        Ok(Self::process_stream(response))
    }
}

impl GeminiRequest {
    fn new(messages: &[PreparedMessage], model_options: &ModelOptions<GeminiModel>) -> Self {
        let system_parts: Vec<GeminiPart> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .flat_map(|m| m.parts.iter().map(GeminiPart::from))
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System && !m.parts.is_empty())
            .map(|m| GeminiContent {
                role: if m.role == Role::Assistant {
                    GeminiRole::Model
                } else {
                    GeminiRole::User
                },
                parts: m.parts.iter().map(GeminiPart::from).collect(),
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(GeminiSystemInstruction {
                parts: system_parts,
            }),
            generation_config: Some(GeminiGenerationConfig {
                temperature: model_options.temperature,
                top_p: model_options.top_p,
                top_k: model_options.provider.top_k,
                max_output_tokens: model_options.max_tokens,
            }),
        }
    }
}

impl From<&ContentPart> for GeminiPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => GeminiPart::Text { text: text.clone() },
            ContentPart::Inline {
                mime_type, data, ..
            } => GeminiPart::InlineData {
                inline_data: GeminiBlob {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
        }
    }
}

impl TryFrom<GeminiResponse> for Response {
    type Error = ClientError;

    fn try_from(gemini_resp: GeminiResponse) -> Result<Self, Self::Error> {
        let Some(candidates) = gemini_resp.candidates else {
            let reason = gemini_resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ClientError::Api {
                vendor: Vendor::Gemini,
                status: 200,
                code: Some(reason.clone()),
                message: format!("prompt was not answered: {reason}"),
            });
        };

        let content = candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter(|p| !p.thought.unwrap_or_default())
            .filter_map(|p| p.text)
            .join("");

        Ok(Response {
            content,
            usage: gemini_resp.usage_metadata.map(Usage::from),
        })
    }
}

// --- Gemini API Request/Response Types ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Copy, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum GeminiRole {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiContent {
    role: GeminiRole,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<NonEmpty<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum GeminiStreamEvent {
    Error { error: GeminiError },
    Chunk(GeminiStreamChunk),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: u32,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
}

impl From<GeminiUsageMetadata> for Usage {
    fn from(u: GeminiUsageMetadata) -> Self {
        Usage {
            prompt_tokens: Some(u.prompt_token_count),
            completion_tokens: Some(
                u.candidates_token_count.unwrap_or_default()
                    + u.thoughts_token_count.unwrap_or_default(),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::InlineKind;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(
            ModelOptions::new(GeminiModel::default()),
            TransportOptions::new(HttpTransport::new("g-key").with_base_url(server.uri())),
        )
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![
            PreparedMessage::text(Role::System, "answer in French"),
            PreparedMessage {
                role: Role::User,
                parts: vec![
                    ContentPart::Text("describe".into()),
                    ContentPart::Inline {
                        mime_type: "image/jpeg".into(),
                        data: "/9j/".into(),
                        name: "p.jpg".into(),
                        kind: InlineKind::Image,
                    },
                ],
            },
            PreparedMessage::text(Role::Assistant, "Une photo"),
        ];
        let value = serde_json::to_value(GeminiRequest::new(
            &messages,
            &ModelOptions::new(GeminiModel::default()).with_max_tokens(64),
        ))
        .unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "answer in French");
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(value["contents"][1]["role"], "model");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 64);
    }

    #[tokio::test]
    async fn test_request_skips_thoughts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"text": "thinking...", "thought": true},
                        {"text": "Bonjour"}
                    ]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 1, "thoughtsTokenCount": 2}
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .request(&[PreparedMessage::text(Role::User, "salut")], DEFAULT_MODEL)
            .await
            .unwrap();
        assert_eq!(response.content, "Bonjour");
        assert_eq!(response.usage.and_then(|u| u.total()), Some(7));
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .request(&[PreparedMessage::text(Role::User, "salut")], DEFAULT_MODEL)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { ref code, .. } if code.as_deref() == Some("SAFETY")));
    }

    #[tokio::test]
    async fn test_error_status_is_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "The input token count (1200000) exceeds the maximum number of tokens allowed (1048576).",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .request(&[PreparedMessage::text(Role::User, "salut")], DEFAULT_MODEL)
            .await
            .unwrap_err();
        assert!(err.is_token_limit());
    }

    #[tokio::test]
    async fn test_stream_uses_sse_endpoint() {
        let server = MockServer::start().await;
        let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Bon\"}]}}]}\r\n\r\n\
                   data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"jour\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let deltas: Vec<String> = client(&server)
            .request_stream(&[PreparedMessage::text(Role::User, "salut")], DEFAULT_MODEL)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(deltas, vec!["Bon", "jour"]);
    }
}
