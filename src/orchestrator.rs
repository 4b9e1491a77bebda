//! Cross-vendor fallback: admission, vendor ordering, failure classification
//! and stream commitment.

use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{Provider, ProviderAdapter, ProviderStream};
use crate::client::ClientError;
use crate::config::Settings;
use crate::model::{Message, NormalizedResponse, Vendor};
use crate::options::{AnthropicModel, GeminiModel, ModelOptions, OpenAiModel};
use crate::providers::{AnthropicClient, GeminiClient, OpenAiClient};
use crate::rate_limit::RateLimiter;
use crate::router::ModelRouter;
use crate::store::{Store, StoreError};
use crate::stream::ChatStream;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("rate limit exceeded for {0}; try again later")]
    RateLimited(String),

    #[error("all providers exhausted: file too large for every configured vendor")]
    AllProvidersExhausted,

    /// The last vendor's own error, unmodified.
    #[error(transparent)]
    Provider(#[from] ClientError),

    #[error("no AI vendor is configured")]
    NoProviders,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to do after vendor `attempt` of `total` failed.
#[derive(Debug)]
pub enum Attempt {
    Next,
    Exhausted(OrchestratorError),
}

pub fn after_failure(attempt: usize, total: usize, error: ClientError) -> Attempt {
    if attempt + 1 < total {
        return Attempt::Next;
    }
    if error.is_token_limit() {
        Attempt::Exhausted(OrchestratorError::AllProvidersExhausted)
    } else {
        Attempt::Exhausted(OrchestratorError::Provider(error))
    }
}

/// Chat entry point for callers: owns one adapter per configured vendor.
pub struct Orchestrator {
    providers: Vec<Arc<dyn Provider>>,
    router: ModelRouter,
    rate_limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("vendors", &self.vendors())
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}

impl Orchestrator {
    /// `providers` is the fallback order used when a call names no preference.
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, OrchestratorError> {
        if providers.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }
        Ok(Self {
            providers,
            router: ModelRouter::new(),
            rate_limiter,
        })
    }

    /// One adapter per vendor with credentials. Must be called inside a
    /// tokio runtime; starts the rate limiter's sweeper.
    pub fn from_settings(settings: &Settings) -> Result<Self, OrchestratorError> {
        let providers: Vec<Arc<dyn Provider>> = settings
            .active_vendors()
            .into_iter()
            .filter_map(|vendor| adapter_for(settings, vendor))
            .collect();

        let rate_limiter = Arc::new(settings.rate_limit.limiter());
        let orchestrator = Self::new(providers, Arc::clone(&rate_limiter))?;
        rate_limiter.spawn_sweeper(settings.rate_limit.sweep_interval());

        info!(vendors = ?orchestrator.vendors(), "orchestrator ready");
        Ok(orchestrator)
    }

    pub fn vendors(&self) -> Vec<Vendor> {
        self.providers.iter().map(|p| p.vendor()).collect()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    fn admit(&self, caller_id: &str) -> Result<(), OrchestratorError> {
        if self.rate_limiter.is_allowed(caller_id) {
            Ok(())
        } else {
            Err(OrchestratorError::RateLimited(caller_id.to_string()))
        }
    }

    fn ordered(&self, preferred: Option<&str>) -> Vec<Arc<dyn Provider>> {
        self.router
            .build_order(preferred, &self.vendors())
            .into_iter()
            .filter_map(|vendor| self.providers.iter().find(|p| p.vendor() == vendor).cloned())
            .collect()
    }

    /// Blocking chat with cross-vendor fallback.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn chat(
        &self,
        messages: &[Message],
        caller_id: &str,
        preferred: Option<&str>,
    ) -> Result<NormalizedResponse, OrchestratorError> {
        self.admit(caller_id)?;
        self.run_chat(messages, preferred).await
    }

    async fn run_chat(
        &self,
        messages: &[Message],
        preferred: Option<&str>,
    ) -> Result<NormalizedResponse, OrchestratorError> {
        let order = self.ordered(preferred);
        let total = order.len();

        for (attempt, provider) in order.iter().enumerate() {
            let vendor = provider.vendor();
            let model = self.router.model_for(vendor, preferred);
            debug!(%vendor, attempt, model = ?model, "trying vendor");

            match provider.complete(messages, model.as_deref()).await {
                Ok(response) => {
                    info!(%vendor, model = %response.model_used, ms = response.processing_time_ms, "chat succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(%vendor, attempt, token_limit = e.is_token_limit(), error = %e, "vendor failed");
                    if let Attempt::Exhausted(err) = after_failure(attempt, total, e) {
                        return Err(err);
                    }
                }
            }
        }
        Err(OrchestratorError::NoProviders)
    }

    /// Streaming chat. Fallback happens only before the first chunk; errors
    /// after that end the stream early.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn chat_stream(
        &self,
        messages: &[Message],
        caller_id: &str,
        preferred: Option<&str>,
    ) -> Result<ChatStream, OrchestratorError> {
        self.admit(caller_id)?;

        let order = self.ordered(preferred);
        let total = order.len();

        for (attempt, provider) in order.iter().enumerate() {
            let vendor = provider.vendor();
            let model = self.router.model_for(vendor, preferred);
            debug!(%vendor, attempt, model = ?model, "trying vendor stream");

            let started = match provider.stream(messages, model.as_deref()).await {
                Ok(started) => commit(started).await,
                Err(e) => Err(e),
            };
            match started {
                Ok(stream) => {
                    info!(%vendor, "stream committed");
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(%vendor, attempt, token_limit = e.is_token_limit(), error = %e, "vendor stream failed");
                    if let Attempt::Exhausted(err) = after_failure(attempt, total, e) {
                        return Err(err);
                    }
                }
            }
        }
        Err(OrchestratorError::NoProviders)
    }

    /// One turn of a stored conversation: saves the user message, answers it
    /// with the full history and saves the reply.
    #[instrument(skip(self, store, user_message))]
    pub async fn chat_in_conversation(
        &self,
        store: &dyn Store,
        conversation_id: &str,
        user_message: Message,
        caller_id: &str,
        preferred: Option<&str>,
    ) -> Result<NormalizedResponse, OrchestratorError> {
        self.admit(caller_id)?;

        let mut history = store.load_history(conversation_id).await?;
        store.save_message(conversation_id, &user_message).await?;
        history.push(user_message);

        let response = self.run_chat(&history, preferred).await?;
        store
            .save_message(conversation_id, &Message::assistant(response.content.clone()))
            .await?;
        Ok(response)
    }
}

/// Wait for the first non-empty delta, then hand the rest to a [`ChatStream`].
async fn commit(started: ProviderStream) -> Result<ChatStream, ClientError> {
    let ProviderStream {
        model_used,
        mut deltas,
    } = started;

    while let Some(item) = deltas.next().await {
        let delta = item?;
        if !delta.is_empty() {
            return Ok(ChatStream::spawn(model_used, delta, deltas));
        }
    }
    Ok(ChatStream::empty(model_used))
}

fn adapter_for(settings: &Settings, vendor: Vendor) -> Option<Arc<dyn Provider>> {
    let vendor_settings = settings.vendor(vendor);
    let transport = vendor_settings.transport_options()?;
    let converter = settings.attachments.converter();
    let delay = settings.pseudo_stream_delay();

    let provider: Arc<dyn Provider> = match vendor {
        Vendor::OpenAi => {
            let mut model_options = ModelOptions::new(OpenAiModel::default());
            model_options.model = vendor_settings.model.clone();
            Arc::new(
                ProviderAdapter::new(OpenAiClient::new(model_options, transport))
                    .with_converter(converter)
                    .with_pseudo_stream_delay(delay),
            )
        }
        Vendor::Anthropic => {
            let mut model_options = ModelOptions::new(AnthropicModel::default());
            model_options.model = vendor_settings.model.clone();
            Arc::new(
                ProviderAdapter::new(AnthropicClient::new(model_options, transport))
                    .with_converter(converter)
                    .with_pseudo_stream_delay(delay),
            )
        }
        Vendor::Gemini => {
            let mut model_options = ModelOptions::new(GeminiModel::default());
            model_options.model = vendor_settings.model.clone();
            Arc::new(
                ProviderAdapter::new(GeminiClient::new(model_options, transport))
                    .with_converter(converter)
                    .with_pseudo_stream_delay(delay),
            )
        }
    };
    Some(provider)
}
