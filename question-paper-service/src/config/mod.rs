use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

pub const SERVICE_NAME: &str = "question-paper-service";

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub uploads: UploadConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_file_bytes: usize,
    pub max_files: usize,
}

impl UploadConfig {
    /// Whole-request ceiling handed to the body limit layer: every file at
    /// its maximum plus room for the text fields and multipart framing.
    pub fn max_request_bytes(&self) -> usize {
        self.max_files
            .saturating_mul(self.max_file_bytes)
            .saturating_add(1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl PaperConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(PaperConfig {
            common: common_config,
            uploads: UploadConfig {
                dir: get_env("UPLOAD_DIR", Some("uploads"), is_prod)?,
                max_file_bytes: parse_env("UPLOAD_MAX_FILE_BYTES", 10 * 1024 * 1024)?,
                max_files: parse_env("UPLOAD_MAX_FILES", 60)?,
            },
            observability: ObservabilityConfig {
                log_level: get_env("LOG_LEVEL", Some("info"), false)?,
                otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env(key: &str, default: usize) -> Result<usize, AppError> {
    match env::var(key) {
        Ok(val) => parse_limit(key, &val),
        Err(_) => Ok(default),
    }
}

fn parse_limit(key: &str, raw: &str) -> Result<usize, AppError> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a positive integer, got '{}'",
            key,
            raw
        ))),
        Ok(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_must_be_positive_integers() {
        assert_eq!(parse_limit("UPLOAD_MAX_FILES", " 12 ").unwrap(), 12);
        assert!(parse_limit("UPLOAD_MAX_FILES", "0").is_err());
        assert!(parse_limit("UPLOAD_MAX_FILES", "ten").is_err());
    }

    #[test]
    fn request_ceiling_covers_every_file() {
        let uploads = UploadConfig {
            dir: "uploads".to_string(),
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 60,
        };
        assert_eq!(
            uploads.max_request_bytes(),
            60 * 10 * 1024 * 1024 + 1024 * 1024
        );
    }
}
