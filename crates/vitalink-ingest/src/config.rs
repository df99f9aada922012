//! Ingestion configuration
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! by the binary first). Missing or unparsable values fall back to the
//! defaults below; [`IngestConfig::validate`] rejects values that would make
//! the pipeline misbehave.

use anyhow::Context;
use std::str::FromStr;
use std::time::Duration;

use crate::db::DbConfig;
use crate::orchestrator::{
    OrchestratorConfig, DEFAULT_EXTRACT_MAX_RETRIES, DEFAULT_MIN_CONTENT_CHARS,
    DEFAULT_PARSE_MAX_RETRIES,
};
use crate::parser::{
    HttpParserConfig, DEFAULT_MAX_INPUT_CHARS, DEFAULT_PARSER_MODEL, DEFAULT_PARSER_TIMEOUT_SECS,
    DEFAULT_PARSER_URL,
};
use crate::recovery::{RetryPolicy, DEFAULT_BACKOFF_MS, DEFAULT_MAX_RETRIES};
use crate::writer::{WriterConfig, DEFAULT_BATCH_SIZE};

/// Tier-1 batch insert attempts
pub const DEFAULT_BATCH_ATTEMPTS: u32 = 1;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database: DbConfig,
    pub parser: ParserConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Attempts for stages without their own setting (catalog lookup)
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub extract_max_retries: u32,
    pub parse_max_retries: u32,
    pub batch_attempts: u32,
    pub batch_size: usize,
    pub min_content_chars: usize,
}

/// Unset or unparseable variables are treated as absent
pub(crate) fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).unwrap_or(default)
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_PARSER_URL.to_string(),
            api_key: None,
            model: DEFAULT_PARSER_MODEL.to_string(),
            timeout_secs: DEFAULT_PARSER_TIMEOUT_SECS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

impl ParserConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env_or("PARSER_API_URL", DEFAULT_PARSER_URL.to_string()),
            api_key: std::env::var("PARSER_API_KEY").ok().filter(|k| !k.is_empty()),
            model: env_or("PARSER_MODEL", DEFAULT_PARSER_MODEL.to_string()),
            timeout_secs: env_or("PARSER_TIMEOUT_SECS", DEFAULT_PARSER_TIMEOUT_SECS),
            max_input_chars: env_or("PARSER_MAX_INPUT_CHARS", DEFAULT_MAX_INPUT_CHARS),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("PARSER_API_URL cannot be empty");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("PARSER_MODEL cannot be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("PARSER_TIMEOUT_SECS must be greater than 0");
        }
        if self.max_input_chars == 0 {
            anyhow::bail!("PARSER_MAX_INPUT_CHARS must be greater than 0");
        }
        Ok(())
    }

    pub fn http_config(&self) -> HttpParserConfig {
        HttpParserConfig {
            base_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_input_chars: self.max_input_chars,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            extract_max_retries: DEFAULT_EXTRACT_MAX_RETRIES,
            parse_max_retries: DEFAULT_PARSE_MAX_RETRIES,
            batch_attempts: DEFAULT_BATCH_ATTEMPTS,
            batch_size: DEFAULT_BATCH_SIZE,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
        }
    }
}

impl RecoveryConfig {
    pub fn from_env() -> Self {
        Self {
            max_retries: env_or("INGEST_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_ms: env_or("INGEST_BACKOFF_MS", DEFAULT_BACKOFF_MS),
            extract_max_retries: env_or("INGEST_EXTRACT_MAX_RETRIES", DEFAULT_EXTRACT_MAX_RETRIES),
            parse_max_retries: env_or("INGEST_PARSE_MAX_RETRIES", DEFAULT_PARSE_MAX_RETRIES),
            batch_attempts: env_or("INGEST_BATCH_ATTEMPTS", DEFAULT_BATCH_ATTEMPTS),
            batch_size: env_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            min_content_chars: env_or("INGEST_MIN_CONTENT_CHARS", DEFAULT_MIN_CONTENT_CHARS),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("INGEST_MAX_RETRIES must be greater than 0");
        }
        if self.extract_max_retries == 0 {
            anyhow::bail!("INGEST_EXTRACT_MAX_RETRIES must be greater than 0");
        }
        if self.parse_max_retries == 0 {
            anyhow::bail!("INGEST_PARSE_MAX_RETRIES must be greater than 0");
        }
        if self.batch_attempts == 0 {
            anyhow::bail!("INGEST_BATCH_ATTEMPTS must be greater than 0");
        }
        if self.batch_size == 0 {
            anyhow::bail!("INGEST_BATCH_SIZE must be greater than 0");
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let policy = |max_retries| RetryPolicy::new(max_retries, self.backoff());
        OrchestratorConfig {
            extract_policy: policy(self.extract_max_retries),
            parse_policy: policy(self.parse_max_retries),
            catalog_policy: policy(self.max_retries),
            writer: WriterConfig {
                batch_size: self.batch_size,
                batch_policy: policy(self.batch_attempts),
            },
            min_content_chars: self.min_content_chars,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database: DbConfig::from_env().context("Failed to load database configuration")?,
            parser: ParserConfig::from_env(),
            recovery: RecoveryConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.database.validate()?;
        self.parser.validate()?;
        self.recovery.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "PARSER_MODEL",
        "PARSER_API_KEY",
        "INGEST_BACKOFF_MS",
        "INGEST_BATCH_SIZE",
        "INGEST_PARSE_MAX_RETRIES",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_recovery_defaults() {
        let config = RecoveryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_ms, 1000);
        assert_eq!(config.extract_max_retries, 2);
        assert_eq!(config.batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let config = RecoveryConfig {
            parse_max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = RecoveryConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_parser_model_rejected() {
        let config = ParserConfig {
            model: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_orchestrator_config_uses_shared_backoff() {
        let recovery = RecoveryConfig {
            backoff_ms: 250,
            batch_attempts: 2,
            ..Default::default()
        };
        let config = recovery.orchestrator_config();

        assert_eq!(config.extract_policy, RetryPolicy::new(2, Duration::from_millis(250)));
        assert_eq!(config.writer.batch_policy.max_retries, 2);
        assert_eq!(config.catalog_policy.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/vitalink_test");
        std::env::set_var("PARSER_MODEL", "local-model");
        std::env::set_var("PARSER_API_KEY", "");
        std::env::set_var("INGEST_BACKOFF_MS", "5");
        std::env::set_var("INGEST_BATCH_SIZE", "not-a-number");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.parser.model, "local-model");
        assert_eq!(config.parser.api_key, None);
        assert_eq!(config.recovery.backoff_ms, 5);
        assert_eq!(config.recovery.batch_size, DEFAULT_BATCH_SIZE);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_values() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/vitalink_test");
        std::env::set_var("INGEST_PARSE_MAX_RETRIES", "0");

        assert!(IngestConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_database_url() {
        clear_env();
        assert!(IngestConfig::from_env().is_err());
    }
}
