//! # aiorch - AI provider orchestration
//!
//! Sends a conversation, with optional file attachments, to one of several AI
//! vendors (OpenAI, Anthropic, Gemini) and falls back to the next vendor when
//! one cannot serve the call.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Per-vendor attachment validation, native images and PDFs, and text
//!   extraction for Word, PDF, CSV and Excel files
//! - Same-vendor model substitution with a visible note
//! - Cross-vendor fallback for blocking and streaming calls
//! - Fixed-window rate limiting per caller
//!
//! ## Architecture
//!
//! - **`Client`**: wire client for one vendor API (`providers`)
//! - **`ProviderAdapter`**: prepares attachments for a vendor and retries on
//!   its stable model when the requested one is unusable
//! - **`Orchestrator`**: rate limiting, vendor ordering and fallback
//!
//! ## Example
//! ```no_run
//! use aiorch::config::Settings;
//! use aiorch::model::{Attachment, Message};
//! use aiorch::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads aiorch.toml and AIORCH__OPENAI__API_KEY style variables.
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::from_settings(&settings)?;
//!
//!     let csv = "id,amount\n1,10\n2,20\n";
//!     let message = Message::user("Summarize this file")
//!         .with_file(Attachment::in_memory("1", "data.csv", "text/csv", csv.as_bytes()));
//!
//!     let response = orchestrator.chat(&[message], "user-42", Some("gpt-4o")).await?;
//!     println!("{} ({})", response.content, response.model_used);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod attachment;
pub mod capability;
pub mod client;
pub mod config;
pub mod extract;
pub mod http;
pub mod model;
pub mod options;
pub mod orchestrator;
pub mod prepare;
pub mod providers;
pub mod rate_limit;
pub mod router;
pub mod sse;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod tokens;

// Re-exports for convenience
pub use adapter::{Provider, ProviderAdapter};
pub use client::{Client, ClientError};
pub use model::{Attachment, Message, NormalizedResponse, Role, StreamChunk, Vendor};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use stream::ChatStream;
