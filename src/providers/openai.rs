//! OpenAI Responses API client implementation.
//!
//! See: <https://platform.openai.com/docs/api-reference/responses>

use async_trait::async_trait;
use futures::StreamExt;
use itertools::Itertools;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientError, DeltaStream, Response};
use crate::http::{add_extra_headers, build_http_client, send_json};
use crate::model::{Role, Usage, Vendor};
use crate::options::{HttpTransport, ModelOptions, OpenAiModel, TransportOptions};
use crate::prepare::{ContentPart, InlineKind, PreparedMessage};
use crate::sse::SSEResponseExt;

const DEFAULT_API_BASE: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";
const STABLE_MODEL: &str = "gpt-4o-mini";

/// OpenAI client using HTTP transport.
pub struct OpenAiClient {
    model_options: ModelOptions<OpenAiModel>,
    transport_options: TransportOptions<HttpTransport>,
}

impl OpenAiClient {
    pub fn new(
        model_options: ModelOptions<OpenAiModel>,
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
            .post(format!("{api_base}/v1/responses"))
            .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
            .header(CONTENT_TYPE, "application/json");

        Ok(add_extra_headers(req, &self.transport_options.provider.extra_headers))
    }

    fn process_stream(response: reqwest::Response) -> DeltaStream {
        response
            .sse()
            .filter_map(|result| async move {
                let event = match result {
                    Ok(line) => serde_json::from_str::<OpenAiStreamEvent>(&line),
                    Err(e) => return Some(Err(e)),
                };
                match event {
                    Ok(OpenAiStreamEvent::OutputTextDelta { delta }) => Some(Ok(delta)),
                    Ok(OpenAiStreamEvent::Failed { response }) => Some(Err(ClientError::Stream(
                        response
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "response failed".to_string()),
                    ))),
                    Ok(OpenAiStreamEvent::Error { message, code }) => Some(Err(ClientError::Stream(
                        match code {
                            Some(code) => format!("{code}: {message}"),
                            None => message,
                        },
                    ))),
                    Ok(OpenAiStreamEvent::Other) => None,
                    Err(e) => Some(Err(ClientError::Parse(e))),
                }
            })
            .boxed()
    }

    /// Handle OpenAI error responses.
    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        match serde_json::from_str::<OpenAiErrorResponse>(body) {
            Ok(error_resp) => ClientError::Api {
                vendor: Vendor::OpenAi,
                status: status.as_u16(),
                code: error_resp.error.code.or(error_resp.error.error_type),
                message: error_resp.error.message,
            },
            Err(_) => ClientError::Api {
                vendor: Vendor::OpenAi,
                status: status.as_u16(),
                code: None,
                message: body.to_string(),
            },
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new(
            ModelOptions::new(OpenAiModel::default()),
            TransportOptions::new(HttpTransport::default()),
        )
    }
}

#[async_trait]
impl Client for OpenAiClient {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
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
        let body = OpenAiRequest::new(messages, &self.model_options, model, false);
        let response = send_json(self.build_request()?, &body, Self::handle_error_response).await?;
        let openai_response: OpenAiResponse = response.json().await?;
        Ok(openai_response.into())
    }

    async fn request_stream(
        &self,
        messages: &[PreparedMessage],
        model: &str,
    ) -> Result<DeltaStream, ClientError> {
        let body = OpenAiRequest::new(messages, &self.model_options, model, true);
        let response = send_json(self.build_request()?, &body, Self::handle_error_response).await?;
        Ok(Self::process_stream(response))
    }
}

impl OpenAiRequest {
    fn new(
        messages: &[PreparedMessage],
        model_options: &ModelOptions<OpenAiModel>,
        model: &str,
        stream: bool,
    ) -> Self {
        let instructions = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(PreparedMessage::joined_text)
            .join("\n\n");

        let input = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(OpenAiMessage::from)
            .filter(|m| !m.content.is_empty())
            .collect();

        OpenAiRequest {
            model: model.to_string(),
            input,
            instructions: Some(instructions).filter(|s| !s.is_empty()),
            max_output_tokens: model_options.max_tokens,
            temperature: model_options.temperature,
            top_p: model_options.top_p,
            user: model_options.provider.user.clone(),
            stream: stream.then_some(true),
        }
    }
}

impl From<&PreparedMessage> for OpenAiMessage {
    fn from(msg: &PreparedMessage) -> Self {
        let assistant = msg.role == Role::Assistant;
        let content = msg
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) if assistant => {
                    Some(OpenAiContent::OutputText { text: text.clone() })
                }
                ContentPart::Text(text) => Some(OpenAiContent::InputText { text: text.clone() }),
                // Files can only be sent as input.
                ContentPart::Inline { .. } if assistant => None,
                ContentPart::Inline {
                    mime_type,
                    data,
                    kind: InlineKind::Image,
                    ..
                } => Some(OpenAiContent::InputImage {
                    image_url: format!("data:{mime_type};base64,{data}"),
                }),
                ContentPart::Inline {
                    mime_type,
                    data,
                    name,
                    kind: InlineKind::Document,
                } => Some(OpenAiContent::InputFile {
                    filename: name.clone(),
                    file_data: format!("data:{mime_type};base64,{data}"),
                }),
            })
            .collect();

        OpenAiMessage {
            message_type: "message",
            role: if assistant {
                OpenAiRole::Assistant
            } else {
                OpenAiRole::User
            },
            content,
        }
    }
}

impl From<OpenAiResponse> for Response {
    fn from(openai_resp: OpenAiResponse) -> Self {
        let content = openai_resp
            .output
            .into_iter()
            .flat_map(|item| match item {
                OpenAiOutput::Message { content } => content,
                OpenAiOutput::Other => Vec::new(),
            })
            .filter_map(|c| match c {
                OpenAiOutputContent::OutputText { text } => Some(text),
                OpenAiOutputContent::Other => None,
            })
            .join("");

        Response {
            content,
            usage: openai_resp.usage.map(Usage::from),
        }
    }
}

// --- OpenAI API Request/Response Types ---

#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest {
    model: String,
    input: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Copy, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum OpenAiRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    #[serde(rename = "type")]
    message_type: &'static str,
    role: OpenAiRole,
    content: Vec<OpenAiContent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContent {
    InputText { text: String },
    OutputText { text: String },
    InputImage { image_url: String },
    InputFile { filename: String, file_data: String },
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    output: Vec<OpenAiOutput>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiOutput {
    Message { content: Vec<OpenAiOutputContent> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiOutputContent {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Copy, Clone, Deserialize)]
struct OpenAiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage {
            prompt_tokens: Some(u.input_tokens),
            completion_tokens: Some(u.output_tokens),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiFailedResponse {
    error: Option<OpenAiError>,
}

/// Streaming event types from OpenAI
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum OpenAiStreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.failed")]
    Failed { response: OpenAiFailedResponse },
    #[serde(rename = "error")]
    Error {
        message: String,
        code: Option<String>,
    },
    #[serde(other)]
    Other,
}
