//! Attachment preparation shared by every vendor adapter.
//!
//! Turns vendor-agnostic [`Message`]s into [`PreparedMessage`]s for one
//! vendor: validation against its capability table, byte resolution, native
//! inline parts for images and admissible PDFs, extracted text for the rest,
//! sniffed text for unsupported small files and a note listing whatever had
//! to be dropped.

use base64::prelude::*;
use bytes::Bytes;
use itertools::Itertools;

use crate::attachment::{AttachmentConverter, ConversionError};
use crate::capability::{validate, ProviderCapabilities};
use crate::client::ClientError;
use crate::extract::{extractor_for, labelled_chunks, pdf, sniff_text, FileKind};
use crate::model::{Attachment, Message, Role};
use crate::tokens::TokenPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    Image,
    Document,
}

/// One piece of a prepared message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Raw file bytes for vendors that ingest them natively.
    Inline {
        mime_type: String,
        /// Standard base64.
        data: String,
        name: String,
        kind: InlineKind,
    },
}

/// A message whose attachments have been resolved for one vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl PreparedMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// All text parts joined by blank lines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Inline { .. } => None,
            })
            .join("\n\n")
    }
}

/// Prepare a conversation for the vendor described by `capabilities`.
///
/// Individual attachments that cannot be used are dropped and listed in a
/// trailing note, and the call proceeds with the rest. The one exception is
/// the last message: when this vendor itself rejected every attachment on it
/// and nothing was included, preparation fails with
/// [`ClientError::Attachments`] so the caller can try a vendor that accepts
/// them. Files that could not be fetched never fail the call, since no other
/// vendor would fare better.
pub async fn prepare_messages(
    messages: &[Message],
    capabilities: &ProviderCapabilities,
    converter: &AttachmentConverter,
    policy: &TokenPolicy,
) -> Result<Vec<PreparedMessage>, ClientError> {
    let last = messages.len().saturating_sub(1);
    let mut prepared = Vec::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        let current = index == last;
        prepared.push(prepare_message(message, capabilities, converter, policy, current).await?);
    }
    Ok(prepared)
}

async fn prepare_message(
    message: &Message,
    capabilities: &ProviderCapabilities,
    converter: &AttachmentConverter,
    policy: &TokenPolicy,
    current: bool,
) -> Result<PreparedMessage, ClientError> {
    let mut parts = Vec::new();
    if !message.content.is_empty() {
        parts.push(ContentPart::Text(message.content.clone()));
    }

    if message.files.is_empty() {
        return Ok(PreparedMessage {
            role: message.role,
            parts,
        });
    }

    let outcome = validate(&message.files, capabilities);
    // Vendor-side refusals may succeed elsewhere; fetch failures will not.
    let mut rejected = outcome.errors.clone();
    let mut unavailable = Vec::new();
    let mut included = 0usize;

    for attachment in &outcome.valid {
        let bytes = match converter.resolve(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                unavailable.push(conversion_reason(attachment, &e));
                continue;
            }
        };

        match prepare_valid(attachment, bytes, capabilities, policy).await {
            Ok(new_parts) => {
                parts.extend(new_parts);
                included += 1;
            }
            Err(reason) => rejected.push(reason),
        }
    }

    for attachment in &outcome.fallback_processable {
        let bytes = match converter.resolve(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                unavailable.push(conversion_reason(attachment, &e));
                continue;
            }
        };

        match sniff_text(&bytes) {
            Some(text) => {
                let label = "File (fallback)";
                parts.extend(
                    labelled_chunks(label, &attachment.name, &text, capabilities.max_tokens_per_chunk)
                        .into_iter()
                        .map(ContentPart::Text),
                );
                included += 1;
            }
            None => rejected.push(format!(
                "{}: unsupported type {} and not readable as text",
                attachment.name, attachment.mime_type
            )),
        }
    }

    tracing::debug!(
        vendor = %capabilities.vendor,
        attached = message.files.len(),
        included,
        rejected = rejected.len(),
        unavailable = unavailable.len(),
        "prepared attachments"
    );

    if current && included == 0 && !rejected.is_empty() {
        return Err(ClientError::Attachments(
            rejected.iter().chain(&unavailable).join("; "),
        ));
    }

    if !rejected.is_empty() || !unavailable.is_empty() {
        parts.push(ContentPart::Text(format!(
            "Note: some attachments could not be included:\n- {}",
            rejected.iter().chain(&unavailable).join("\n- ")
        )));
    }

    Ok(PreparedMessage {
        role: message.role,
        parts,
    })
}

fn conversion_reason(attachment: &Attachment, error: &ConversionError) -> String {
    match error {
        ConversionError::Unresolvable { .. } | ConversionError::SizeMismatch { .. } => {
            error.to_string()
        }
        _ => format!("{}: {error}", attachment.name),
    }
}

/// Route an accepted attachment to a native part or its extractor.
async fn prepare_valid(
    attachment: &Attachment,
    bytes: Bytes,
    capabilities: &ProviderCapabilities,
    policy: &TokenPolicy,
) -> Result<Vec<ContentPart>, String> {
    let kind = FileKind::classify(&attachment.mime_type, &attachment.name);

    match kind {
        FileKind::Image => return Ok(vec![inline(attachment, &bytes, InlineKind::Image)]),
        FileKind::Pdf if capabilities.native_pdf => {
            let admission = policy.can_admit_pdf(attachment.size_bytes);
            if admission.can_process {
                return Ok(vec![inline(attachment, &bytes, InlineKind::Document)]);
            }
            tracing::debug!(
                attachment = %attachment.name,
                estimated_tokens = admission.estimated_tokens,
                reason = admission.reason.as_deref().unwrap_or_default(),
                "PDF not admitted natively, extracting text"
            );
        }
        _ => {}
    }

    if kind == FileKind::Pdf {
        return prepare_pdf_text(attachment, bytes, capabilities, policy).await;
    }

    let Some(extractor) = extractor_for(kind) else {
        return sniff_text(&bytes)
            .map(|text| {
                labelled_chunks("File", &attachment.name, &text, capabilities.max_tokens_per_chunk)
                    .into_iter()
                    .map(ContentPart::Text)
                    .collect()
            })
            .ok_or_else(|| format!("{}: no extractor for {}", attachment.name, attachment.mime_type));
    };

    let name = attachment.name.clone();
    let budget = capabilities.max_tokens_per_chunk;
    let segments = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &name, budget))
        .await
        .map_err(|e| format!("{}: extraction aborted: {e}", attachment.name))?;

    Ok(segments.into_iter().map(ContentPart::Text).collect())
}

/// Extract a PDF's text layer. A scan without one is attached as a document
/// part when the size ceiling allows it, and dropped otherwise.
async fn prepare_pdf_text(
    attachment: &Attachment,
    bytes: Bytes,
    capabilities: &ProviderCapabilities,
    policy: &TokenPolicy,
) -> Result<Vec<ContentPart>, String> {
    let name = attachment.name.clone();
    let budget = capabilities.max_tokens_per_chunk;
    let (bytes, segments) = tokio::task::spawn_blocking(move || {
        let text = pdf::extract_text(&bytes, &name);
        let segments = if text.trim().is_empty() {
            Vec::new()
        } else {
            pdf::assemble_pdf_segments(&text, &name, budget)
        };
        (bytes, segments)
    })
    .await
    .map_err(|e| format!("{}: extraction aborted: {e}", attachment.name))?;

    if !segments.is_empty() {
        return Ok(segments.into_iter().map(ContentPart::Text).collect());
    }

    let admission = policy.can_admit_pdf(attachment.size_bytes);
    if !admission.can_process {
        return Err(format!(
            "{}: no extractable text layer and {}",
            attachment.name,
            admission.reason.as_deref().unwrap_or("too large to attach")
        ));
    }
    tracing::debug!(attachment = %attachment.name, "PDF has no text layer, attaching as document");
    Ok(vec![
        ContentPart::Text(pdf::no_text_placeholder(&attachment.name)),
        inline(attachment, &bytes, InlineKind::Document),
    ])
}

fn inline(attachment: &Attachment, bytes: &[u8], kind: InlineKind) -> ContentPart {
    ContentPart::Inline {
        mime_type: attachment.mime_type.clone(),
        data: BASE64_STANDARD.encode(bytes),
        name: attachment.name.clone(),
        kind,
    }
}
