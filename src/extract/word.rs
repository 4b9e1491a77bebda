use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use thiserror::Error;

use super::{labelled_chunks, FormatExtractor};

#[derive(Debug, Error)]
pub enum WordError {
    #[error("not a .docx archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document XML: {0}")]
    Xml(String),
}

/// Word (.docx) documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordExtractor;

impl FormatExtractor for WordExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str, max_tokens_per_chunk: usize) -> Vec<String> {
        match read_docx_text(bytes) {
            Ok(text) if text.trim().is_empty() => {
                vec![format!("[Word document {file_name} contains no text]")]
            }
            Ok(text) => labelled_chunks("Word document", file_name, &text, max_tokens_per_chunk),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "word extraction failed");
                vec![format!(
                    "[Could not extract text from Word document {file_name}: {e}]"
                )]
            }
        }
    }
}

/// Raw paragraph text of `word/document.xml`, one line per paragraph.
pub fn read_docx_text(bytes: &[u8]) -> Result<String, WordError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader
            .read_event()
            .map_err(|e| WordError::Xml(e.to_string()))?
        {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| WordError::Xml(e.to_string()))?;
                out.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}
