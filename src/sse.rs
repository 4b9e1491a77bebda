//! Server-Sent Events (SSE) stream processing.
//!
//! All three vendors stream with SSE framing:
//! ```text
//! event: content_block_delta
//! data: {"key": "value"}
//!
//! data: [DONE]
//! ```
//! Only `data:` payloads are surfaced; `event:` names, ids and comments are
//! dropped because every vendor repeats the event type inside the JSON body.

use futures::stream::{self, Stream, StreamExt};

use crate::client::ClientError;

/// Extension trait turning a streaming HTTP response into SSE data payloads.
pub trait SSEResponseExt {
    /// Stream of raw `data:` payloads, ending at `[DONE]` or end of body.
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send {
        let byte_stream = Box::pin(self.bytes_stream());

        stream::unfold(
            (byte_stream, SseDecoder::default(), false),
            |(mut byte_stream, mut decoder, mut ended)| async move {
                loop {
                    if let Some(event) = decoder.next_payload() {
                        return match event {
                            Payload::Data(data) => Some((Ok(data), (byte_stream, decoder, ended))),
                            Payload::Done => None,
                        };
                    }

                    if ended {
                        return decoder
                            .finish()
                            .map(|data| (Ok(data), (byte_stream, decoder, ended)));
                    }

                    match byte_stream.next().await {
                        Some(Ok(chunk)) => decoder.push(&chunk),
                        Some(Err(e)) => {
                            return Some((Err(ClientError::from(e)), (byte_stream, decoder, true)))
                        }
                        None => ended = true,
                    }
                }
            },
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Payload {
    Data(String),
    Done,
}

/// Incremental line decoder. Buffers raw bytes so multi-byte characters split
/// across network chunks decode correctly.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    fn next_payload(&mut self) -> Option<Payload> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(payload) = Self::classify(&line) {
                return Some(payload);
            }
        }
        None
    }

    /// Flush a trailing line that had no newline terminator.
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        match Self::classify(&String::from_utf8_lossy(&rest))? {
            Payload::Data(data) => Some(data),
            Payload::Done => None,
        }
    }

    fn classify(line: &str) -> Option<Payload> {
        let data = parse_sse_line(line.trim())?;
        if is_done_marker(data) {
            Some(Payload::Done)
        } else if data.is_empty() {
            None
        } else {
            Some(Payload::Data(data.to_string()))
        }
    }
}

/// Extract the payload of a `data:` line.
///
/// ```
/// use aiorch::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"a\":1}"), Some("{\"a\":1}"));
/// assert_eq!(parse_sse_line("data:{\"a\":1}"), Some("{\"a\":1}"));
/// assert_eq!(parse_sse_line("event: ping"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|s| s.trim())
}

/// Whether an SSE data payload is the OpenAI-style end marker.
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello"), Some("hello"));
        assert_eq!(parse_sse_line("data:   spaces  "), Some("spaces"));
        assert_eq!(parse_sse_line("event: message_start"), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_decoder_skips_event_lines() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"event: content_block_delta\ndata: {\"x\":1}\n\n");
        assert_eq!(decoder.next_payload(), Some(Payload::Data("{\"x\":1}".into())));
        assert_eq!(decoder.next_payload(), None);
    }

    #[test]
    fn test_decoder_joins_split_utf8() {
        let mut decoder = SseDecoder::default();
        let line = "data: \"olá\"\n".as_bytes();
        let split = line.len() - 3;
        decoder.push(&line[..split]);
        assert_eq!(decoder.next_payload(), None);
        decoder.push(&line[split..]);
        assert_eq!(decoder.next_payload(), Some(Payload::Data("\"olá\"".into())));
    }

    #[test]
    fn test_decoder_done_and_trailing_line() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: [DONE]\n");
        assert_eq!(decoder.next_payload(), Some(Payload::Done));

        let mut decoder = SseDecoder::default();
        decoder.push(b"data: tail");
        assert_eq!(decoder.next_payload(), None);
        assert_eq!(decoder.finish(), Some("tail".to_string()));
    }
}
