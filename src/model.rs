//! Vendor-agnostic data models shared by adapters and the orchestrator.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// An external AI completion service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Vendor {
    /// All vendors in their default insertion order.
    pub const ALL: [Vendor; 3] = [Vendor::OpenAi, Vendor::Anthropic, Vendor::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" | "chatgpt" => Ok(Vendor::OpenAi),
            "anthropic" | "claude" => Ok(Vendor::Anthropic),
            "gemini" | "google" => Ok(Vendor::Gemini),
            other => Err(format!("unknown vendor: {other}")),
        }
    }
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single message in a conversation, optionally carrying file attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            files: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach a file to the message.
    pub fn with_file(mut self, attachment: Attachment) -> Self {
        self.files.push(attachment);
        self
    }
}

/// A caller-held file object that is already reachable without the network.
#[derive(Debug, Clone)]
pub enum LocalFile {
    /// Bytes already in memory.
    Memory(Bytes),
    /// A file on local disk, read on demand.
    Path(PathBuf),
}

/// A file reference attached to a message.
///
/// Exactly one of `local`, `inline_base64` or `remote_url` has to resolve to
/// bytes, and the resolved payload length must equal `size_bytes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip)]
    pub local: Option<LocalFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_base64: Option<String>,
}

impl Attachment {
    /// An attachment whose bytes are already in memory.
    pub fn in_memory(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes: data.len() as u64,
            remote_url: None,
            local: Some(LocalFile::Memory(data)),
            inline_base64: None,
        }
    }

    /// An attachment that has to be fetched from a URL.
    pub fn remote(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            remote_url: Some(url.into()),
            local: None,
            inline_base64: None,
        }
    }

    /// Add a remote URL as a second resolution strategy.
    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }
}

/// Token usage information reported by a vendor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

impl Usage {
    /// Prompt plus completion tokens, if the vendor reported any.
    pub fn total(&self) -> Option<u32> {
        match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or_default() + c.unwrap_or_default()),
        }
    }
}

/// Vendor-agnostic result of a blocking chat call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedResponse {
    pub content: String,
    pub model_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    pub processing_time_ms: u64,
}

/// One element of a streamed reply.
///
/// A stream ends with exactly one chunk whose `is_complete` is set and whose
/// delta is empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamChunk {
    pub content_delta: String,
    pub is_complete: bool,
    pub model_used: String,
}

impl StreamChunk {
    pub fn delta(model_used: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content_delta: content.into(),
            is_complete: false,
            model_used: model_used.into(),
        }
    }

    pub fn complete(model_used: impl Into<String>) -> Self {
        Self {
            content_delta: String::new(),
            is_complete: true,
            model_used: model_used.into(),
        }
    }
}
