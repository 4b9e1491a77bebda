//! End-to-end fallback scenarios against mocked vendor endpoints.

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aiorch::config::Settings;
use aiorch::model::{Attachment, Message, Vendor};
use aiorch::orchestrator::{Orchestrator, OrchestratorError};
use aiorch::tokens::TokenPolicy;

const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

struct Vendors {
    openai: MockServer,
    anthropic: MockServer,
    gemini: MockServer,
}

impl Vendors {
    async fn start() -> Self {
        Self {
            openai: MockServer::start().await,
            anthropic: MockServer::start().await,
            gemini: MockServer::start().await,
        }
    }

    fn orchestrator(&self, order: &[Vendor]) -> Orchestrator {
        let order = order.iter().map(|v| format!("\"{v}\"")).collect::<Vec<_>>().join(", ");
        let settings = Settings::from_toml_str(&format!(
            r#"
            vendor_order = [{order}]
            pseudo_stream_delay_ms = 0

            [openai]
            api_key = "sk-test"
            base_url = "{}"

            [anthropic]
            api_key = "sk-ant-test"
            base_url = "{}"

            [gemini]
            api_key = "g-test"
            base_url = "{}"
            "#,
            self.openai.uri(),
            self.anthropic.uri(),
            self.gemini.uri()
        ))
        .unwrap();
        Orchestrator::from_settings(&settings).unwrap()
    }
}

fn openai_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "output": [{"type": "message", "role": "assistant", "content": [
            {"type": "output_text", "text": text}
        ]}],
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }))
}

fn gemini_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}]
    }))
}

fn sales_csv() -> String {
    let mut csv = String::from("id,amount,label\n");
    for i in 1..=10 {
        csv.push_str(&format!("{i},{}.5,{}\n", i * 10, if i % 2 == 0 { "even" } else { "odd" }));
    }
    csv
}

#[tokio::test]
async fn spreadsheet_unsupported_by_first_vendor_falls_back() {
    let vendors = Vendors::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&vendors.anthropic)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(openai_reply("The sheet has totals."))
        .expect(1)
        .mount(&vendors.openai)
        .await;

    let orchestrator = vendors.orchestrator(&[Vendor::Anthropic, Vendor::OpenAi]);
    // Zip local header followed by binary noise, as in a real workbook.
    let mut workbook = b"PK\x03\x04\x14\x00\x06\x00".to_vec();
    workbook.extend((0u8..=255).cycle().take(4096));
    let message = Message::user("What is in this workbook?")
        .with_file(Attachment::in_memory("1", "totals.xlsx", MIME_XLSX, workbook));

    let response = orchestrator.chat(&[message], "caller", None).await.unwrap();

    assert_eq!(response.content, "The sheet has totals.");
    assert_eq!(response.model_used, "gpt-4o");
    assert_eq!(response.token_count, Some(15));
}

#[tokio::test]
async fn token_limits_everywhere_exhaust_with_one_error() {
    let vendors = Vendors::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"type": "invalid_request_error", "code": "context_length_exceeded",
                      "message": "This model's maximum context length is 128000 tokens."}
        })))
        .mount(&vendors.openai)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(413).set_body_json(json!({
            "type": "error",
            "error": {"type": "request_too_large", "message": "Request exceeds the maximum allowed size."}
        })))
        .mount(&vendors.anthropic)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "status": "INVALID_ARGUMENT",
                      "message": "The input token count (1200000) exceeds the maximum number of tokens allowed (1048576)."}
        })))
        .mount(&vendors.gemini)
        .await;

    let orchestrator = vendors.orchestrator(&Vendor::ALL);
    let err = orchestrator
        .chat(&[Message::user("a very long prompt")], "caller", None)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::AllProvidersExhausted));
    assert!(err.to_string().contains("file too large for every configured vendor"));
}

#[tokio::test]
async fn csv_is_summarized_in_one_segment() {
    let vendors = Vendors::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1beta/models/gemini-2\.5-flash:generateContent$"))
        .and(body_string_contains("Rows: 10"))
        .and(body_string_contains("Columns: 3"))
        .and(body_string_contains("amount: numeric, 10 values, min 10.5, max 100.5, mean 55.50"))
        .and(body_string_contains("label: text, 10 values, 2 distinct"))
        .respond_with(gemini_reply("Ten sales rows."))
        .expect(1)
        .mount(&vendors.gemini)
        .await;

    let orchestrator = vendors.orchestrator(&[Vendor::Gemini]);
    let message = Message::user("Summarize")
        .with_file(Attachment::in_memory("1", "sales.csv", "text/csv", sales_csv().into_bytes()));

    let response = orchestrator.chat(&[message], "caller", Some("gemini")).await.unwrap();
    assert_eq!(response.content, "Ten sales rows.");
    assert_eq!(response.model_used, "gemini-2.5-flash");
}

#[tokio::test]
async fn stream_falls_back_then_completes_once() {
    let vendors = Vendors::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"type": "invalid_request_error", "code": "invalid_api_key", "message": "Incorrect API key provided."}
        })))
        .mount(&vendors.openai)
        .await;
    let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello \"}]}}]}\r\n\r\n\
               data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"world\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n";
    Mock::given(method("POST"))
        .and(path_regex(r":streamGenerateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&vendors.gemini)
        .await;

    let orchestrator = vendors.orchestrator(&[Vendor::OpenAi, Vendor::Gemini]);
    let chunks: Vec<_> = orchestrator
        .chat_stream(&[Message::user("hi")], "caller", None)
        .await
        .unwrap()
        .collect()
        .await;

    let text: String = chunks.iter().map(|c| c.content_delta.as_str()).collect();
    assert_eq!(text, "Hello world");
    assert_eq!(chunks.iter().filter(|c| c.is_complete).count(), 1);
    let last = chunks.last().unwrap();
    assert!(last.is_complete && last.content_delta.is_empty());
    assert!(chunks.iter().all(|c| c.model_used == "gemini-2.5-flash"));
}

#[tokio::test]
async fn rejected_everywhere_returns_last_vendor_error() {
    let vendors = Vendors::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&vendors.openai)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&vendors.anthropic)
        .await;

    let orchestrator = vendors.orchestrator(&[Vendor::OpenAi, Vendor::Anthropic]);
    let err = orchestrator
        .chat(&[Message::user("hi")], "caller", None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "anthropic error (401): invalid x-api-key");
}

#[tokio::test]
async fn too_many_files_for_first_vendor_go_to_the_next() {
    let vendors = Vendors::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_reply("unreachable"))
        .expect(0)
        .mount(&vendors.openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("File: note-12.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "Twelve notes read."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 40, "output_tokens": 4}
        })))
        .expect(1)
        .mount(&vendors.anthropic)
        .await;

    let orchestrator = vendors.orchestrator(&[Vendor::OpenAi, Vendor::Anthropic]);
    let message = (1..=12).fold(Message::user("Read all notes"), |message, i| {
        message.with_file(Attachment::in_memory(
            i.to_string(),
            format!("note-{i}.txt"),
            "text/plain",
            format!("note number {i}"),
        ))
    });

    let response = orchestrator.chat(&[message], "caller", None).await.unwrap();

    assert_eq!(response.content, "Twelve notes read.");
    assert_eq!(response.model_used, "claude-sonnet-4-20250514");
}

#[tokio::test]
async fn failed_download_is_noted_and_the_call_proceeds() {
    let vendors = Vendors::start().await;
    let files = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&files)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":generateContent$"))
        .and(body_string_contains("What changed?"))
        .and(body_string_contains("some attachments could not be included"))
        .and(body_string_contains("report.txt"))
        .respond_with(gemini_reply("Nothing I can see."))
        .expect(1)
        .mount(&vendors.gemini)
        .await;

    let orchestrator = vendors.orchestrator(&[Vendor::Gemini]);
    let message = Message::user("What changed?").with_file(Attachment::remote(
        "1",
        "report.txt",
        "text/plain",
        128,
        format!("{}/report.txt", files.uri()),
    ));

    let response = orchestrator.chat(&[message], "caller", None).await.unwrap();
    assert_eq!(response.content, "Nothing I can see.");
    assert_eq!(response.model_used, "gemini-2.5-flash");
}

#[test]
fn oversized_pdf_is_refused_by_byte_ceiling() {
    let admission = TokenPolicy::default().can_admit_pdf(60 * 1024 * 1024);
    assert!(!admission.can_process);
    assert!(admission.reason.unwrap_or_default().contains("32"));
}
