use std::path::Path;

use crate::config::schema::{BlobConfig, Config};
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.worker_count == 0 {
        return Err(invalid("worker_count must be at least 1"));
    }

    if config.extraction.min_text_chars == 0 {
        return Err(invalid("extraction.min_text_chars must be at least 1"));
    }

    let timeouts = &config.timeouts;
    if timeouts.blob_fetch_secs == 0 || timeouts.extraction_secs == 0 || timeouts.tailoring_secs == 0
    {
        return Err(invalid("Stage timeouts must be greater than zero"));
    }

    if !(0.0..=2.0).contains(&config.ai.temperature) {
        return Err(invalid(format!(
            "ai.temperature must be between 0 and 2, got {}",
            config.ai.temperature
        )));
    }

    if config.ai.max_tokens == 0 {
        return Err(invalid("ai.max_tokens must be at least 1"));
    }

    if !has_secret_source(
        config.ai.api_key.as_deref(),
        config.ai.api_key_file.as_deref(),
        config.ai.api_key_env.as_deref(),
    ) {
        return Err(invalid(
            "ai needs one of api_key, api_key_file or api_key_env",
        ));
    }

    match &config.blob {
        BlobConfig::Filesystem { root } if root.trim().is_empty() => {
            return Err(invalid("blob.root must not be empty"));
        }
        BlobConfig::Http {
            base_url, bucket, ..
        } => {
            if base_url.trim().is_empty() {
                return Err(invalid("blob.base_url must not be empty"));
            }
            if bucket.trim().is_empty() {
                return Err(invalid("blob.bucket must not be empty"));
            }
        }
        _ => {}
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
