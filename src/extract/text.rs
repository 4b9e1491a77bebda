use super::{labelled_chunks, FormatExtractor};

/// UTF-8 text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl FormatExtractor for TextExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str, max_tokens_per_chunk: usize) -> Vec<String> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text),
            Err(e) => {
                return vec![format!(
                    "[File {file_name} could not be decoded as UTF-8 text: {e}]"
                )]
            }
        };

        if text.trim().is_empty() {
            return vec![format!("[File {file_name} is empty]")];
        }

        labelled_chunks("File", file_name, text, max_tokens_per_chunk)
    }
}
