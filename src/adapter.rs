//! Vendor adapters: attachment preparation plus in-vendor model fallback on
//! top of a wire [`Client`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::attachment::AttachmentConverter;
use crate::capability::ProviderCapabilities;
use crate::client::{Client, ClientError, DeltaStream, ModelIssue, Response};
use crate::model::{Message, NormalizedResponse, Vendor};
use crate::prepare::{prepare_messages, PreparedMessage};
use crate::stream::pseudo_stream;
use crate::tokens::TokenPolicy;

pub const DEFAULT_PSEUDO_STREAM_DELAY: Duration = Duration::from_millis(20);

/// A started vendor stream and the model actually serving it.
pub struct ProviderStream {
    pub model_used: String,
    pub deltas: DeltaStream,
}

impl std::fmt::Debug for ProviderStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStream")
            .field("model_used", &self.model_used)
            .finish_non_exhaustive()
    }
}

/// Vendor-agnostic completion interface the orchestrator drives.
#[async_trait]
pub trait Provider: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Blocking completion. `model` of `None` means the vendor's default.
    async fn complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
    ) -> Result<NormalizedResponse, ClientError>;

    /// Streaming completion. An `Err` means nothing was produced.
    async fn stream(
        &self,
        messages: &[Message],
        model: Option<&str>,
    ) -> Result<ProviderStream, ClientError>;
}

/// [`Provider`] implementation shared by every vendor.
///
/// When the vendor reports that the chosen model is unusable (organization
/// verification, unknown model, no streaming), the call is retried once on
/// the client's stable model and the reply is prefixed with a note saying so.
/// Streams rejected for streaming support are first replayed from a blocking
/// call on the same model.
pub struct ProviderAdapter<C: Client> {
    client: C,
    capabilities: ProviderCapabilities,
    converter: AttachmentConverter,
    policy: TokenPolicy,
    pseudo_stream_delay: Duration,
}

impl<C: Client> ProviderAdapter<C> {
    pub fn new(client: C) -> Self {
        Self {
            capabilities: ProviderCapabilities::for_vendor(client.vendor()),
            client,
            converter: AttachmentConverter::default(),
            policy: TokenPolicy::default(),
            pseudo_stream_delay: DEFAULT_PSEUDO_STREAM_DELAY,
        }
    }

    pub fn with_converter(mut self, converter: AttachmentConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_pseudo_stream_delay(mut self, delay: Duration) -> Self {
        self.pseudo_stream_delay = delay;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn prepare(&self, messages: &[Message]) -> Result<Vec<PreparedMessage>, ClientError> {
        prepare_messages(messages, &self.capabilities, &self.converter, &self.policy).await
    }

    /// The stable model to retry with, if `error` warrants it.
    fn substitute_for(&self, model: &str, error: &ClientError) -> Option<(ModelIssue, String)> {
        let issue = error.model_issue()?;
        let stable = self.client.stable_model();
        (stable != model).then(|| (issue, stable.to_string()))
    }

    async fn stream_with_stable(
        &self,
        prepared: &[PreparedMessage],
        requested: &str,
        issue: ModelIssue,
        stable: String,
    ) -> Result<ProviderStream, ClientError> {
        let deltas = self.client.request_stream(prepared, &stable).await?;
        let note = substitution_note(requested, issue, &stable);
        Ok(ProviderStream {
            model_used: stable,
            deltas: stream::once(async move { Ok(format!("{note}\n\n")) })
                .chain(deltas)
                .boxed(),
        })
    }
}

fn substitution_note(requested: &str, issue: ModelIssue, stable: &str) -> String {
    format!(
        "Note: model {requested} {}; answered with {stable} instead.",
        issue.describe()
    )
}

fn normalize(response: Response, model_used: String, note: Option<String>, started: Instant) -> NormalizedResponse {
    let content = match note {
        Some(note) => format!("{note}\n\n{}", response.content),
        None => response.content,
    };
    NormalizedResponse {
        content,
        model_used,
        token_count: response.usage.and_then(|u| u.total()),
        processing_time_ms: started.elapsed().as_millis() as u64,
    }
}

#[async_trait]
impl<C: Client> Provider for ProviderAdapter<C> {
    fn vendor(&self) -> Vendor {
        self.client.vendor()
    }

    async fn complete(
        &self,
        messages: &[Message],
        model: Option<&str>,
    ) -> Result<NormalizedResponse, ClientError> {
        let started = Instant::now();
        let prepared = self.prepare(messages).await?;
        let model = model.unwrap_or(self.client.default_model()).to_string();

        match self.client.request(&prepared, &model).await {
            Ok(response) => Ok(normalize(response, model, None, started)),
            Err(e) => {
                let Some((issue, stable)) = self.substitute_for(&model, &e) else {
                    return Err(e);
                };
                warn!(
                    vendor = %self.vendor(),
                    model = %model,
                    stable = %stable,
                    issue = issue.describe(),
                    "model unavailable, retrying with stable model"
                );
                let response = self.client.request(&prepared, &stable).await?;
                let note = substitution_note(&model, issue, &stable);
                Ok(normalize(response, stable, Some(note), started))
            }
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
        model: Option<&str>,
    ) -> Result<ProviderStream, ClientError> {
        let prepared = self.prepare(messages).await?;
        let model = model.unwrap_or(self.client.default_model()).to_string();

        let error = match self.client.request_stream(&prepared, &model).await {
            Ok(deltas) => {
                return Ok(ProviderStream {
                    model_used: model,
                    deltas,
                })
            }
            Err(e) => e,
        };

        if error.model_issue() == Some(ModelIssue::StreamingUnsupported) {
            debug!(vendor = %self.vendor(), model = %model, "streaming rejected, replaying a blocking call");
            match self.client.request(&prepared, &model).await {
                Ok(response) => {
                    return Ok(ProviderStream {
                        model_used: model,
                        deltas: pseudo_stream(response.content, self.pseudo_stream_delay),
                    })
                }
                Err(e) => debug!(vendor = %self.vendor(), error = %e, "blocking replay failed"),
            }
        }

        let Some((issue, stable)) = self.substitute_for(&model, &error) else {
            return Err(error);
        };
        warn!(
            vendor = %self.vendor(),
            model = %model,
            stable = %stable,
            issue = issue.describe(),
            "model unavailable for streaming, switching to stable model"
        );
        self.stream_with_stable(&prepared, &model, issue, stable).await
    }
}
