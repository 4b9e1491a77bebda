//! Process-level settings: vendor credentials, rate limits and attachment
//! handling, layered from defaults, an optional TOML file and `AIORCH__*`
//! environment variables.

use config::{Config, ConfigError, Environment, File, FileFormat};
use itertools::Itertools;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::attachment::{AttachmentConverter, DEFAULT_MAX_LOCAL_BYTES};
use crate::model::Vendor;
use crate::options::{HttpTransport, SecretString, TransportOptions};
use crate::rate_limit::RateLimiter;

pub const DEFAULT_CONFIG_FILE: &str = "aiorch.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorSettings {
    /// The vendor is active iff this is set.
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    /// Default model for calls that do not name one.
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub proxy: Option<String>,
}

impl VendorSettings {
    pub fn transport_options(&self) -> Option<TransportOptions<HttpTransport>> {
        let api_key = self.api_key.clone()?;
        let mut provider = HttpTransport::new(api_key);
        provider.base_url = self.base_url.clone();
        provider.proxy = self.proxy.clone();

        let mut transport = TransportOptions::new(provider);
        if let Some(secs) = self.timeout_secs {
            transport = transport.with_timeout(Duration::from_secs(secs));
        }
        Some(transport)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 900,
            max_requests: 100,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(Duration::from_secs(self.window_secs), self.max_requests)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttachmentSettings {
    pub read_timeout_secs: u64,
    pub max_local_bytes: u64,
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            read_timeout_secs: 30,
            max_local_bytes: DEFAULT_MAX_LOCAL_BYTES,
        }
    }
}

impl AttachmentSettings {
    pub fn converter(&self) -> AttachmentConverter {
        AttachmentConverter::new(Duration::from_secs(self.read_timeout_secs), self.max_local_bytes)
    }
}

fn default_pseudo_stream_delay_ms() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub openai: VendorSettings,
    #[serde(default)]
    pub anthropic: VendorSettings,
    #[serde(default)]
    pub gemini: VendorSettings,
    /// Fallback order; empty means openai, anthropic, gemini.
    #[serde(default)]
    pub vendor_order: Vec<Vendor>,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub attachments: AttachmentSettings,
    #[serde(default = "default_pseudo_stream_delay_ms")]
    pub pseudo_stream_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai: VendorSettings::default(),
            anthropic: VendorSettings::default(),
            gemini: VendorSettings::default(),
            vendor_order: Vec::new(),
            rate_limit: RateLimitSettings::default(),
            attachments: AttachmentSettings::default(),
            pseudo_stream_delay_ms: default_pseudo_stream_delay_ms(),
        }
    }
}

impl Settings {
    /// Load `aiorch.toml` from the working directory, if any, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    /// Settings from a TOML document alone.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix("AIORCH")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("vendor_order")
    }

    pub fn vendor(&self, vendor: Vendor) -> &VendorSettings {
        match vendor {
            Vendor::OpenAi => &self.openai,
            Vendor::Anthropic => &self.anthropic,
            Vendor::Gemini => &self.gemini,
        }
    }

    /// Vendors with credentials, in fallback order.
    pub fn active_vendors(&self) -> Vec<Vendor> {
        let order: &[Vendor] = if self.vendor_order.is_empty() {
            &Vendor::ALL
        } else {
            &self.vendor_order
        };
        order
            .iter()
            .copied()
            .unique()
            .filter(|v| self.vendor(*v).api_key.is_some())
            .collect()
    }

    pub fn pseudo_stream_delay(&self) -> Duration {
        Duration::from_millis(self.pseudo_stream_delay_ms)
    }
}
