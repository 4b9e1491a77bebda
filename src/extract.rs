//! Format-specific text extraction for attachments.
//!
//! A file is classified once into a [`FileKind`]; each kind that needs text
//! extraction has one [`FormatExtractor`] shared by every vendor adapter.
//! Extractors never fail outward: problems become an explanatory segment.

pub mod pdf;
pub mod sniff;
pub mod tabular;
pub mod text;
pub mod word;

use crate::capability::{normalize_mime, MIME_DOCX, MIME_PDF, MIME_XLS, MIME_XLSX};
use crate::tokens::{chunk_text, estimate_text_tokens};

pub use pdf::PdfExtractor;
pub use sniff::sniff_text;
pub use tabular::{CsvExtractor, ExcelExtractor};
pub use text::TextExtractor;
pub use word::WordExtractor;

/// Closed set of attachment formats, resolved once at the validation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Word,
    Pdf,
    Csv,
    Excel,
    Image,
    Unsupported,
}

impl FileKind {
    /// Classify by MIME type, falling back to a type guessed from the file
    /// name when the declared one is generic.
    pub fn classify(mime_type: &str, file_name: &str) -> Self {
        match Self::from_mime(&normalize_mime(mime_type)) {
            FileKind::Unsupported => mime_guess::from_path(file_name)
                .iter_raw()
                .map(Self::from_mime)
                .find(|kind| *kind != FileKind::Unsupported)
                .unwrap_or(FileKind::Unsupported),
            kind => kind,
        }
    }

    fn from_mime(mime: &str) -> Self {
        match mime {
            MIME_PDF => FileKind::Pdf,
            MIME_DOCX | "application/msword" => FileKind::Word,
            MIME_XLSX | MIME_XLS | "application/vnd.oasis.opendocument.spreadsheet" => FileKind::Excel,
            "text/csv" | "application/csv" => FileKind::Csv,
            "application/json" | "application/xml" | "application/x-yaml" | "text/x-yaml" => {
                FileKind::Text
            }
            m if m.starts_with("image/") => FileKind::Image,
            m if m.starts_with("text/") => FileKind::Text,
            _ => FileKind::Unsupported,
        }
    }
}

/// Turns file bytes into ordered text segments bounded by a token budget.
pub trait FormatExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], file_name: &str, max_tokens_per_chunk: usize) -> Vec<String>;
}

static TEXT: TextExtractor = TextExtractor;
static WORD: WordExtractor = WordExtractor;
static PDF: PdfExtractor = PdfExtractor;
static CSV: CsvExtractor = CsvExtractor;
static EXCEL: ExcelExtractor = ExcelExtractor;

/// The extractor for a kind, or `None` for kinds sent natively or not at all.
pub fn extractor_for(kind: FileKind) -> Option<&'static dyn FormatExtractor> {
    match kind {
        FileKind::Text => Some(&TEXT),
        FileKind::Word => Some(&WORD),
        FileKind::Pdf => Some(&PDF),
        FileKind::Csv => Some(&CSV),
        FileKind::Excel => Some(&EXCEL),
        FileKind::Image | FileKind::Unsupported => None,
    }
}

/// Prefix `body` with a `label: file_name` header and split it on the token
/// budget, numbering parts when there is more than one.
pub(crate) fn labelled_chunks(
    label: &str,
    file_name: &str,
    body: &str,
    max_tokens: usize,
) -> Vec<String> {
    let header = format!("{label}: {file_name}");
    let budget = max_tokens
        .saturating_sub(estimate_text_tokens(&header) + 8)
        .max(1);
    let pieces = chunk_text(body, budget);
    let total = pieces.len();

    if total == 1 {
        return vec![format!("{header}\n\n{}", pieces[0])];
    }
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| format!("{header} (part {}/{total})\n\n{piece}", i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_mime() {
        assert_eq!(FileKind::classify("application/pdf", "x"), FileKind::Pdf);
        assert_eq!(FileKind::classify(MIME_XLSX, "x"), FileKind::Excel);
        assert_eq!(FileKind::classify("text/csv; charset=utf-8", "x"), FileKind::Csv);
        assert_eq!(FileKind::classify("text/markdown", "x"), FileKind::Text);
        assert_eq!(FileKind::classify("image/webp", "x"), FileKind::Image);
    }

    #[test]
    fn test_classify_falls_back_to_file_name() {
        assert_eq!(FileKind::classify("application/octet-stream", "data.CSV"), FileKind::Csv);
        assert_eq!(FileKind::classify("application/octet-stream", "blob"), FileKind::Unsupported);
        assert_eq!(FileKind::classify("", "Scan.PDF"), FileKind::Pdf);
        assert_eq!(FileKind::classify("binary/octet-stream", "budget.ods"), FileKind::Excel);
        assert_eq!(FileKind::classify("application/octet-stream", "memo.docx"), FileKind::Word);
        assert_eq!(FileKind::classify("application/octet-stream", "photo.jpeg"), FileKind::Image);
        assert_eq!(FileKind::classify("application/octet-stream", "archive.zip"), FileKind::Unsupported);
    }

    #[test]
    fn test_labelled_chunks_numbers_parts() {
        let body = "word ".repeat(200);
        let chunks = labelled_chunks("File", "a.txt", &body, 50);
        assert!(chunks.len() > 1);
        assert!(chunks[0].starts_with(&format!("File: a.txt (part 1/{})", chunks.len())));

        let single = labelled_chunks("File", "a.txt", "short", 50);
        assert_eq!(single, vec!["File: a.txt\n\nshort".to_string()]);
    }
}
