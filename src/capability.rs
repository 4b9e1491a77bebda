//! Per-vendor attachment capabilities and the validation stage built on them.

use crate::model::{Attachment, Vendor};

const MB: u64 = 1024 * 1024;

/// Unsupported attachments at or above this size are not worth sniffing as text.
pub const FALLBACK_MAX_BYTES: u64 = MB;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLS: &str = "application/vnd.ms-excel";

const IMAGES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const TEXT: &[&str] = &["text/plain", "text/csv", "text/markdown", "application/json"];

/// Static attachment configuration for one vendor.
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    pub vendor: Vendor,
    /// Exact MIME types or wildcard categories such as `image/*`.
    pub accepted_types: Vec<String>,
    /// Size ceiling applied when no type-specific ceiling matches.
    pub max_file_size: u64,
    pub max_files: usize,
    /// Type-specific ceilings; the first matching pattern wins.
    pub type_limits: Vec<(String, u64)>,
    /// Whether PDFs can be sent as native documents instead of extracted text.
    pub native_pdf: bool,
    /// Token budget for a single extracted text segment.
    pub max_tokens_per_chunk: usize,
}

fn owned(types: &[&[&str]]) -> Vec<String> {
    types
        .iter()
        .flat_map(|group| group.iter())
        .map(|t| t.to_string())
        .collect()
}

impl ProviderCapabilities {
    pub fn for_vendor(vendor: Vendor) -> Self {
        match vendor {
            Vendor::OpenAi => Self {
                vendor,
                accepted_types: owned(&[IMAGES, TEXT, &[MIME_PDF, MIME_DOCX, MIME_XLSX, MIME_XLS]]),
                max_file_size: 25 * MB,
                max_files: 10,
                type_limits: vec![("image/*".into(), 20 * MB), (MIME_PDF.into(), 32 * MB)],
                native_pdf: false,
                max_tokens_per_chunk: 30_000,
            },
            Vendor::Anthropic => Self {
                vendor,
                accepted_types: owned(&[IMAGES, TEXT, &[MIME_PDF, MIME_DOCX]]),
                max_file_size: 32 * MB,
                max_files: 20,
                type_limits: vec![("image/*".into(), 5 * MB), ("text/*".into(), 10 * MB)],
                native_pdf: true,
                max_tokens_per_chunk: 50_000,
            },
            Vendor::Gemini => Self {
                vendor,
                accepted_types: owned(&[
                    &["image/*"],
                    TEXT,
                    &[MIME_PDF, MIME_DOCX, MIME_XLSX, MIME_XLS],
                ]),
                max_file_size: 20 * MB,
                max_files: 16,
                type_limits: vec![(MIME_PDF.into(), 20 * MB)],
                native_pdf: true,
                max_tokens_per_chunk: 100_000,
            },
        }
    }

    pub fn accepts(&self, mime_type: &str) -> bool {
        self.accepted_types
            .iter()
            .any(|pattern| mime_matches(pattern, mime_type))
    }

    /// Effective size ceiling for a MIME type.
    pub fn size_limit(&self, mime_type: &str) -> u64 {
        self.type_limits
            .iter()
            .find(|(pattern, _)| mime_matches(pattern, mime_type))
            .map(|(_, limit)| *limit)
            .unwrap_or(self.max_file_size)
    }
}

/// Lowercased MIME type without parameters (`text/plain; charset=utf-8` → `text/plain`).
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Match a MIME type against an exact type or a `category/*` wildcard.
pub fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    let mime = normalize_mime(mime_type);
    match pattern.strip_suffix("/*") {
        Some(category) => mime
            .split_once('/')
            .is_some_and(|(head, _)| head == category),
        None => pattern.eq_ignore_ascii_case(&mime),
    }
}

/// Human-readable size, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Partition of an attachment batch for one vendor.
///
/// Every input attachment lands in exactly one of the three lists.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<Attachment>,
    /// Unsupported type but small enough for generic text sniffing.
    pub fallback_processable: Vec<Attachment>,
    pub invalid: Vec<Attachment>,
    pub errors: Vec<String>,
}

/// Partition `attachments` against a vendor's capabilities.
pub fn validate(attachments: &[Attachment], capabilities: &ProviderCapabilities) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    if attachments.len() > capabilities.max_files {
        outcome.errors.push(format!(
            "too many files: {} attached, {} accepts at most {}",
            attachments.len(),
            capabilities.vendor,
            capabilities.max_files
        ));
        outcome.invalid = attachments.to_vec();
        return outcome;
    }

    for attachment in attachments {
        if !capabilities.accepts(&attachment.mime_type) {
            if attachment.size_bytes < FALLBACK_MAX_BYTES {
                outcome.fallback_processable.push(attachment.clone());
            } else {
                outcome.errors.push(format!(
                    "{}: unsupported type {} and file too large for text fallback ({} >= {})",
                    attachment.name,
                    attachment.mime_type,
                    format_size(attachment.size_bytes),
                    format_size(FALLBACK_MAX_BYTES)
                ));
                outcome.invalid.push(attachment.clone());
            }
            continue;
        }

        let limit = capabilities.size_limit(&attachment.mime_type);
        if attachment.size_bytes > limit {
            outcome.errors.push(format!(
                "{}: file too large ({} > {} allowed for {})",
                attachment.name,
                format_size(attachment.size_bytes),
                format_size(limit),
                attachment.mime_type
            ));
            outcome.invalid.push(attachment.clone());
            continue;
        }

        outcome.valid.push(attachment.clone());
    }

    outcome
}
