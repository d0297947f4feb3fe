//! Process-wide configuration.
//!
//! Read once from the environment (after loading `.env`) at startup and shared
//! read-only afterwards.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
pub const DEFAULT_CHAT_MODEL: &str = "mistral-medium-latest";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_LOG_FILTER: &str = "medical_report_extractor=info,tower_http=info";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024; // 50MB
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct Config {
    /// `MISTRAL_API_KEY`, required by both OCR and chat clients.
    pub mistral_api_key: Option<String>,
    pub mistral_api_base: String,
    pub ocr_model: String,
    pub chat_model: String,
    pub bind_addr: String,
    /// `RUST_LOG`-style directive string.
    pub log_filter: String,
    pub max_upload_bytes: usize,
    pub http_timeout: Duration,
    /// Where scoped upload files are written; system temp dir when unset.
    pub upload_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mistral_api_key: None,
            mistral_api_base: DEFAULT_API_BASE.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            upload_dir: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "mistral_api_key",
                &self.mistral_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("mistral_api_base", &self.mistral_api_base)
            .field("ocr_model", &self.ocr_model)
            .field("chat_model", &self.chat_model)
            .field("bind_addr", &self.bind_addr)
            .field("log_filter", &self.log_filter)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("http_timeout", &self.http_timeout)
            .field("upload_dir", &self.upload_dir)
            .finish()
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid MAX_UPLOAD_BYTES: {:?}", v))?,
            None => defaults.max_upload_bytes,
        };

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.trim()
                    .parse()
                    .with_context(|| format!("Invalid HTTP_TIMEOUT_SECS: {:?}", v))?,
            ),
            None => defaults.http_timeout,
        };

        Ok(Self {
            mistral_api_key: get("MISTRAL_API_KEY"),
            mistral_api_base: get("MISTRAL_API_BASE").unwrap_or(defaults.mistral_api_base),
            ocr_model: get("MISTRAL_OCR_MODEL").unwrap_or(defaults.ocr_model),
            chat_model: get("MISTRAL_CHAT_MODEL").unwrap_or(defaults.chat_model),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_filter: get("RUST_LOG").unwrap_or(defaults.log_filter),
            max_upload_bytes,
            http_timeout,
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from),
        })
    }

    pub fn api_key_configured(&self) -> bool {
        self.mistral_api_key.is_some()
    }

    /// Shared outbound HTTP client for the OCR and chat APIs.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .context("Failed to build HTTP client")
    }
}
