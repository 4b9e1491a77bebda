//! Resolution of attachment references into raw bytes.
//!
//! Strategies run in order: caller-held local file, inline base64, remote URL.
//! Local objects are trusted and cheap; remote fetches can fail for network or
//! permission reasons outside the caller's control.

use base64::prelude::*;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

use crate::model::{Attachment, LocalFile};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_LOCAL_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("reading local file timed out after {0:?}")]
    Timeout(Duration),

    #[error("local file is {size} bytes which exceeds the {limit} byte read limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("{name}: declared {declared} bytes but resolved {actual}")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    #[error("remote file not found (404)")]
    NotFound,

    #[error("access to remote file denied (403)")]
    Forbidden,

    #[error("remote fetch failed: {0}")]
    Network(String),

    #[error("remote fetch returned HTTP {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid inline base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("could not convert {name}: {reasons}")]
    Unresolvable { name: String, reasons: String },
}

/// Turns [`Attachment`] references into payload bytes.
#[derive(Debug, Clone)]
pub struct AttachmentConverter {
    http: reqwest::Client,
    read_timeout: Duration,
    max_local_bytes: u64,
}

impl Default for AttachmentConverter {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT, DEFAULT_MAX_LOCAL_BYTES)
    }
}

impl AttachmentConverter {
    pub fn new(read_timeout: Duration, max_local_bytes: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            read_timeout,
            max_local_bytes,
        }
    }

    /// Resolve an attachment's bytes, enforcing the declared size.
    pub async fn resolve(&self, attachment: &Attachment) -> Result<Bytes, ConversionError> {
        let mut reasons = Vec::new();

        if let Some(local) = &attachment.local {
            match self.read_local(local).await {
                Ok(bytes) => return Self::check_size(attachment, bytes),
                Err(e) => {
                    tracing::debug!(attachment = %attachment.name, error = %e, "local read failed");
                    reasons.push(format!("local: {e}"));
                }
            }
        }

        if let Some(encoded) = &attachment.inline_base64 {
            match decode_inline(encoded) {
                Ok(bytes) => return Self::check_size(attachment, bytes),
                Err(e) => reasons.push(format!("inline: {e}")),
            }
        }

        if let Some(url) = &attachment.remote_url {
            match self.fetch_remote(url).await {
                Ok(bytes) => return Self::check_size(attachment, bytes),
                Err(e) => {
                    tracing::debug!(attachment = %attachment.name, url = %url, error = %e, "remote fetch failed");
                    reasons.push(format!("remote: {e}"));
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("no local file, inline data or remote URL".to_string());
        }
        Err(ConversionError::Unresolvable {
            name: attachment.name.clone(),
            reasons: reasons.join("; "),
        })
    }

    fn check_size(attachment: &Attachment, bytes: Bytes) -> Result<Bytes, ConversionError> {
        if bytes.len() as u64 != attachment.size_bytes {
            return Err(ConversionError::SizeMismatch {
                name: attachment.name.clone(),
                declared: attachment.size_bytes,
                actual: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }

    async fn read_local(&self, local: &LocalFile) -> Result<Bytes, ConversionError> {
        match local {
            LocalFile::Memory(bytes) => {
                self.check_local_limit(bytes.len() as u64)?;
                Ok(bytes.clone())
            }
            LocalFile::Path(path) => {
                let read = async {
                    let size = tokio::fs::metadata(path).await?.len();
                    self.check_local_limit(size)?;
                    Ok::<_, ConversionError>(Bytes::from(tokio::fs::read(path).await?))
                };
                tokio::time::timeout(self.read_timeout, read)
                    .await
                    .map_err(|_| ConversionError::Timeout(self.read_timeout))?
            }
        }
    }

    fn check_local_limit(&self, size: u64) -> Result<(), ConversionError> {
        if size > self.max_local_bytes {
            return Err(ConversionError::TooLarge {
                size,
                limit: self.max_local_bytes,
            });
        }
        Ok(())
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes, ConversionError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ConversionError::Network(e.to_string()))?;

        match response.status().as_u16() {
            404 => Err(ConversionError::NotFound),
            403 => Err(ConversionError::Forbidden),
            status if !response.status().is_success() => Err(ConversionError::Status(status)),
            _ => response
                .bytes()
                .await
                .map_err(|e| ConversionError::Network(e.to_string())),
        }
    }
}

/// Decode inline base64, accepting an optional `data:<mime>;base64,` prefix.
fn decode_inline(encoded: &str) -> Result<Bytes, ConversionError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    Ok(Bytes::from(BASE64_STANDARD.decode(payload.trim())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_local_memory_wins_over_remote() {
        let attachment = Attachment::in_memory("1", "a.txt", "text/plain", "hello")
            .with_remote_url("http://127.0.0.1:9/never");
        let bytes = AttachmentConverter::default().resolve(&attachment).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_local_path_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"on disk").unwrap();
        let attachment = Attachment {
            local: Some(LocalFile::Path(file.path().to_path_buf())),
            ..Attachment::remote("2", "d.txt", "text/plain", 7, "http://127.0.0.1:9/never")
        };
        let bytes = AttachmentConverter::default().resolve(&attachment).await.unwrap();
        assert_eq!(&bytes[..], b"on disk");
    }

    #[tokio::test]
    async fn test_oversized_local_falls_back_to_remote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&server)
            .await;

        let attachment = Attachment::in_memory("3", "big.txt", "text/plain", "0123456789")
            .with_remote_url(format!("{}/big.txt", server.uri()));
        let converter = AttachmentConverter::new(DEFAULT_READ_TIMEOUT, 4);
        let bytes = converter.resolve(&attachment).await.unwrap();
        assert_eq!(bytes.len(), 10);
    }

    #[tokio::test]
    async fn test_remote_status_reasons_are_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let converter = AttachmentConverter::default();
        let missing = Attachment::remote("4", "m.pdf", "application/pdf", 1, format!("{}/missing", server.uri()));
        let private = Attachment::remote("5", "p.pdf", "application/pdf", 1, format!("{}/private", server.uri()));

        let err = converter.resolve(&missing).await.unwrap_err().to_string();
        assert!(err.contains("m.pdf") && err.contains("404"), "{err}");
        let err = converter.resolve(&private).await.unwrap_err().to_string();
        assert!(err.contains("403"), "{err}");
    }

    #[tokio::test]
    async fn test_size_mismatch_is_rejected() {
        let mut attachment = Attachment::in_memory("6", "a.txt", "text/plain", "hello");
        attachment.size_bytes = 3;
        let err = AttachmentConverter::default().resolve(&attachment).await.unwrap_err();
        assert!(matches!(err, ConversionError::SizeMismatch { declared: 3, actual: 5, .. }));
    }

    #[tokio::test]
    async fn test_inline_data_url() {
        let attachment = Attachment {
            inline_base64: Some("data:text/plain;base64,aGk=".to_string()),
            ..Attachment::remote("7", "hi.txt", "text/plain", 2, "")
        };
        let attachment = Attachment { remote_url: None, ..attachment };
        let bytes = AttachmentConverter::default().resolve(&attachment).await.unwrap();
        assert_eq!(&bytes[..], b"hi");
    }

    #[tokio::test]
    async fn test_nothing_to_resolve() {
        let attachment = Attachment {
            remote_url: None,
            ..Attachment::remote("8", "ghost.bin", "application/octet-stream", 0, "")
        };
        let err = AttachmentConverter::default().resolve(&attachment).await.unwrap_err();
        assert!(matches!(err, ConversionError::Unresolvable { .. }));
    }
}
