//! Streaming chat with cross-vendor fallback.
//!
//! Run with:
//! ```bash
//! export AIORCH__OPENAI__API_KEY="your-openai-key"
//! export AIORCH__GEMINI__API_KEY="your-gemini-key"
//! cargo run --example chat_stream -- path/to/report.pdf
//! ```

use futures::StreamExt;
use std::io::Write;

use aiorch::config::Settings;
use aiorch::model::{Attachment, Message};
use aiorch::orchestrator::Orchestrator;
use aiorch::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(false)?;

    let settings = Settings::load()?;
    let orchestrator = Orchestrator::from_settings(&settings)?;

    let mut message = Message::user("Write a haiku about Rust programming.");
    if let Some(path) = std::env::args().nth(1) {
        let bytes = tokio::fs::read(&path).await?;
        let name = std::path::Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let mime = if name.ends_with(".pdf") {
            "application/pdf"
        } else {
            "text/plain"
        };
        message = Message::user("Summarize the attached file.")
            .with_file(Attachment::in_memory("1", name, mime, bytes));
    }

    let mut stream = orchestrator.chat_stream(&[message], "demo", None).await?;

    while let Some(chunk) = stream.next().await {
        if chunk.is_complete {
            println!("\n\n=== Answered by {} ===", chunk.model_used);
            break;
        }
        print!("{}", chunk.content_delta);
        std::io::stdout().flush()?;
    }

    Ok(())
}
