//! Token estimation used for admission control before a vendor call.
//!
//! These are heuristics, not billing: the PDF constants approximate one
//! vendor's multimodal encoding and are kept in [`TokenPolicy`] so they can be
//! tuned without touching callers.

use crate::capability::format_size;

/// Characters per token for the plain-text heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

const MB: u64 = 1024 * 1024;

/// Tunable constants for PDF admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Flat estimate for PDFs below `small_pdf_bytes`.
    pub pdf_floor_tokens: usize,
    pub small_pdf_bytes: u64,
    /// Bytes per token for PDFs at or above `small_pdf_bytes`.
    pub pdf_bytes_per_token: u64,
    /// Absolute ceiling vendors enforce regardless of token cost.
    pub pdf_max_bytes: u64,
    pub pdf_max_tokens: usize,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            pdf_floor_tokens: 1_500,
            small_pdf_bytes: MB,
            pdf_bytes_per_token: 10 * 1024,
            pdf_max_bytes: 32 * MB,
            pdf_max_tokens: 100_000,
        }
    }
}

/// Result of [`TokenPolicy::can_admit_pdf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfAdmission {
    pub can_process: bool,
    pub estimated_tokens: usize,
    pub reason: Option<String>,
}

impl TokenPolicy {
    /// Estimated multimodal token cost of a PDF of `size_bytes`.
    pub fn estimate_pdf_tokens(&self, size_bytes: u64) -> usize {
        if size_bytes < self.small_pdf_bytes {
            return self.pdf_floor_tokens;
        }
        let linear = size_bytes / self.pdf_bytes_per_token.max(1);
        self.pdf_floor_tokens + linear as usize
    }

    /// Whether a PDF can be sent natively. The byte ceiling is checked first.
    pub fn can_admit_pdf(&self, size_bytes: u64) -> PdfAdmission {
        let estimated_tokens = self.estimate_pdf_tokens(size_bytes);

        if size_bytes > self.pdf_max_bytes {
            return PdfAdmission {
                can_process: false,
                estimated_tokens,
                reason: Some(format!(
                    "PDF is {} which exceeds the {} byte ceiling",
                    format_size(size_bytes),
                    format_size(self.pdf_max_bytes)
                )),
            };
        }

        if estimated_tokens > self.pdf_max_tokens {
            return PdfAdmission {
                can_process: false,
                estimated_tokens,
                reason: Some(format!(
                    "PDF needs about {estimated_tokens} tokens, above the {} token limit",
                    self.pdf_max_tokens
                )),
            };
        }

        PdfAdmission {
            can_process: true,
            estimated_tokens,
            reason: None,
        }
    }
}

/// Plain-text estimate: one token per [`CHARS_PER_TOKEN`] characters, rounded up.
pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split `text` into segments of at most `max_tokens` estimated tokens.
///
/// Splits prefer the last newline, then the last whitespace, inside each
/// window. No characters are dropped: concatenating the segments yields `text`.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let window_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());

        if window_end == rest.len() {
            chunks.push(rest.to_string());
            break;
        }

        let window = &rest[..window_end];
        let split = window
            .rfind('\n')
            .or_else(|| window.rfind(char::is_whitespace))
            .map(|idx| idx + window[idx..].chars().next().map_or(1, char::len_utf8))
            .filter(|idx| *idx > window.len() / 2)
            .unwrap_or(window_end);

        chunks.push(rest[..split].to_string());
        rest = &rest[split..];
    }

    chunks
}

/// Split `text` into exactly `parts` slices of (nearly) equal character length.
pub fn split_even(text: &str, parts: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let parts = parts.max(1);
    let size = chars.len().div_ceil(parts).max(1);
    let mut slices: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
    slices.resize(parts, String::new());
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_pdfs_share_the_floor() {
        let policy = TokenPolicy::default();
        assert_eq!(policy.estimate_pdf_tokens(1), 1_500);
        assert_eq!(policy.estimate_pdf_tokens(MB - 1), 1_500);
    }

    #[test]
    fn test_large_pdfs_scale_monotonically() {
        let policy = TokenPolicy::default();
        let sizes = [MB, 2 * MB, 5 * MB, 20 * MB];
        let estimates: Vec<_> = sizes.iter().map(|s| policy.estimate_pdf_tokens(*s)).collect();
        assert!(estimates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(policy.estimate_pdf_tokens(MB), 1_500 + 102);
    }

    #[test]
    fn test_sixty_megabyte_pdf_hits_byte_ceiling() {
        let policy = TokenPolicy {
            pdf_max_tokens: usize::MAX,
            ..TokenPolicy::default()
        };
        let admission = policy.can_admit_pdf(60 * MB);
        assert!(!admission.can_process);
        assert!(admission.reason.unwrap().contains("byte ceiling"));
    }

    #[test]
    fn test_token_ceiling_checked_after_bytes() {
        let policy = TokenPolicy {
            pdf_max_tokens: 2_000,
            ..TokenPolicy::default()
        };
        let admission = policy.can_admit_pdf(10 * MB);
        assert!(!admission.can_process);
        assert!(admission.reason.unwrap().contains("token limit"));
        assert!(policy.can_admit_pdf(1024).can_process);
    }

    #[test]
    fn test_text_estimate_rounds_up() {
        assert_eq!(estimate_text_tokens(""), 0);
        assert_eq!(estimate_text_tokens("abcde"), 2);
    }

    #[test]
    fn test_chunk_text_preserves_every_character() {
        let text = "line one\nline two is longer\nthird\n".repeat(40);
        let chunks = chunk_text(&text, 10);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| estimate_text_tokens(c) <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_text_handles_multibyte() {
        let text = "ação ".repeat(100);
        assert_eq!(chunk_text(&text, 3).concat(), text);
    }

    #[test]
    fn test_split_even_covers_text() {
        let parts = split_even("abcdefghij", 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.concat(), "abcdefghij");
    }
}
