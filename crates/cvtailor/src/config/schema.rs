use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::DEFAULT_MAX_RETRIES;
use crate::processor::DEFAULT_MIN_TEXT_CHARS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    pub blob: BlobConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// The configured database path, or `~/.cvtailor/data/cvtailor.db`.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        match self.database_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => crate::db::default_database_path(),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Where uploaded resumes are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlobConfig {
    Filesystem {
        root: String,
    },
    Http {
        base_url: String,
        bucket: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        api_key_file: Option<String>,
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: default_languages(),
            dpi: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

fn default_min_text_chars() -> usize {
    DEFAULT_MIN_TEXT_CHARS
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
        }
    }
}

/// Chat completion endpoint used for tailoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_key_env() -> Option<String> {
    Some("CVTAILOR_AI_API_KEY".to_string())
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Per-stage limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_blob_fetch_secs")]
    pub blob_fetch_secs: u64,
    #[serde(default = "default_extraction_secs")]
    pub extraction_secs: u64,
    #[serde(default = "default_tailoring_secs")]
    pub tailoring_secs: u64,
}

fn default_blob_fetch_secs() -> u64 {
    30
}

fn default_extraction_secs() -> u64 {
    120
}

fn default_tailoring_secs() -> u64 {
    180
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            blob_fetch_secs: default_blob_fetch_secs(),
            extraction_secs: default_extraction_secs(),
            tailoring_secs: default_tailoring_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
