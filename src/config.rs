use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cleanup::CleanupConfig;
use crate::resilience::{BreakerConfig, RetryPolicy};

/// Main configuration structure for Copydesk
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CopydeskConfig {
    /// Retry/backoff defaults for content store operations
    pub retry: RetrySettings,
    /// Circuit breaker settings, shared by all operation classes
    pub breaker: BreakerSettings,
    /// Retention cleanup settings
    pub cleanup: CleanupConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
    /// Exponential growth factor between attempts
    pub backoff_multiplier: f64,
    /// Random delay spread, 0.2 = +/-20%
    pub jitter_ratio: f64,
    /// Per-attempt wall clock budget in milliseconds
    pub attempt_timeout_ms: u64,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_ratio: self.jitter_ratio,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakerSettings {
    /// Consecutive transient failures before the breaker opens
    pub failure_threshold: u32,
    /// Seconds an open breaker rejects calls before a half-open trial
    pub cooldown_seconds: u64,
}

impl BreakerSettings {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_seconds),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON-structured log lines
    pub json_logs: bool,
}

impl Default for CopydeskConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings {
                max_retries: 3,
                base_delay_ms: 500,
                max_delay_ms: 30_000,
                backoff_multiplier: 2.0,
                jitter_ratio: 0.2,
                attempt_timeout_ms: 10_000,
            },
            breaker: BreakerSettings {
                failure_threshold: 5,
                cooldown_seconds: 30,
            },
            cleanup: CleanupConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl CopydeskConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (copydesk.toml, .copydesk-rc)
    /// 3. Environment variables (prefixed with COPYDESK_)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&CopydeskConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("copydesk.toml").exists() {
            builder = builder.add_source(File::with_name("copydesk"));
        }

        if Path::new(".copydesk-rc").exists() {
            builder = builder.add_source(File::with_name(".copydesk-rc"));
        }

        builder = builder.add_source(
            Environment::with_prefix("COPYDESK")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<CopydeskConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = CopydeskConfig::load_env_file();
        CopydeskConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static CopydeskConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_convert_to_runtime_types() {
        let config = CopydeskConfig::default();

        let policy = config.retry.policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));

        let breaker = config.breaker.breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = CopydeskConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let restored: CopydeskConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(restored.cleanup, config.cleanup);
        assert_eq!(restored.retry.max_retries, config.retry.max_retries);
    }

    #[test]
    fn test_save_to_file_writes_readable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copydesk.toml");

        let mut config = CopydeskConfig::default();
        config.cleanup.audit_log_retention_days = 45;
        config.save_to_file(&path).unwrap();

        let restored: CopydeskConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(restored.cleanup.audit_log_retention_days, 45);
    }
}
