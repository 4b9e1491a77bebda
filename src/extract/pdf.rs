use pdf_oxide::PdfDocument;
use std::io::Write;

use super::FormatExtractor;
use crate::tokens::{estimate_text_tokens, split_even};

/// PDF documents, extracted page by page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl FormatExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str, max_tokens_per_chunk: usize) -> Vec<String> {
        let text = extract_text(bytes, file_name);
        if text.trim().is_empty() {
            return vec![no_text_placeholder(file_name)];
        }
        assemble_pdf_segments(&text, file_name, max_tokens_per_chunk)
    }
}

/// The text layer of every page, or an empty string when there is none or
/// the file cannot be parsed.
pub fn extract_text(bytes: &[u8], file_name: &str) -> String {
    match extract_pages(bytes) {
        Ok(pages) => pages.join("\n\n"),
        Err(e) => {
            tracing::warn!(file = %file_name, error = %e, "PDF text extraction failed");
            String::new()
        }
    }
}

pub fn no_text_placeholder(file_name: &str) -> String {
    format!("[PDF {file_name} has no extractable text layer.]")
}

#[tracing::instrument(skip(bytes), fields(size = bytes.len()))]
fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut temp_file =
        tempfile::NamedTempFile::new().map_err(|e| format!("failed to create temp file: {e}"))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| format!("failed to write temp file: {e}"))?;

    let mut doc =
        PdfDocument::open(temp_file.path()).map_err(|e| format!("failed to parse PDF: {e}"))?;
    let page_count = doc
        .page_count()
        .map_err(|e| format!("failed to read page count: {e}"))?;

    let mut pages = Vec::with_capacity(page_count);
    for page_index in 0..page_count {
        let text = doc.extract_text(page_index).unwrap_or_default();
        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    tracing::debug!(page_count, text_pages = pages.len(), "PDF text extraction complete");
    Ok(pages)
}

/// Heuristic for Brazilian electronic tax invoices (DANFE).
pub fn is_danfe(file_name: &str, text: &str) -> bool {
    let name = file_name.to_lowercase();
    if name.contains("danfe") || name.contains("nfe") || name.contains("nota_fiscal") || name.contains("nota fiscal") {
        return true;
    }
    let upper = text.to_uppercase();
    upper.contains("DANFE")
        || upper.contains("DOCUMENTO AUXILIAR DA NOTA FISCAL")
        || (upper.contains("CHAVE DE ACESSO") && upper.contains("CNPJ"))
}

fn render_prompt(danfe: bool, file_name: &str, text: &str, part: Option<(usize, usize)>) -> String {
    let part = part
        .map(|(i, n)| format!(" (part {i}/{n})"))
        .unwrap_or_default();

    if danfe {
        format!(
            "The PDF {file_name}{part} appears to be a Brazilian electronic tax invoice (DANFE). \
             Extract its data in a structured form:\n\
             - Emitter: name, CNPJ, state registration, address\n\
             - Recipient: name, CNPJ/CPF, address\n\
             - Line items: code, description, quantity, unit price, total\n\
             - Taxes: ICMS, IPI, PIS, COFINS bases and amounts\n\
             - Totals: products, freight, discounts, invoice total\n\
             - Invoice number, series, issue date and access key\n\n\
             Extracted text:\n{text}"
        )
    } else {
        format!("Content extracted from PDF {file_name}{part}:\n\n{text}")
    }
}

/// Wrap extracted PDF text in a prompt, splitting the text (not the
/// scaffolding) into `ceil(estimate / budget)` equal slices when needed.
pub fn assemble_pdf_segments(text: &str, file_name: &str, max_tokens_per_chunk: usize) -> Vec<String> {
    let danfe = is_danfe(file_name, text);
    let prompt = render_prompt(danfe, file_name, text, None);
    let estimated = estimate_text_tokens(&prompt);
    let budget = max_tokens_per_chunk.max(1);

    if estimated <= budget {
        return vec![prompt];
    }

    let parts = estimated.div_ceil(budget);
    split_even(text, parts)
        .iter()
        .enumerate()
        .map(|(i, slice)| render_prompt(danfe, file_name, slice, Some((i + 1, parts))))
        .collect()
}
