use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::RetryConfig;

// ============================================================================
// Settings
// ============================================================================
//
// Layered configuration:
//   1. optional `config/settings.{toml,yaml,json}`
//   2. environment variables prefixed with ADMIN, `__` as section separator
//      e.g. ADMIN_SCYLLA__KNOWN_NODES=10.0.0.1:9042,10.0.0.2:9042
//
// `.env` files are loaded first through dotenvy.
//
// ============================================================================

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub scylla: ScyllaConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScyllaConfig {
    #[serde(default = "default_known_nodes")]
    pub known_nodes: Vec<String>,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    /// Start the CDC log reader on the enterprises table.
    #[serde(default = "default_true")]
    pub cdc_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutboxConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_outbox_batch_size")]
    pub batch_size: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_admin_group")]
    pub admin_group: String,
    #[serde(default = "default_creator_group")]
    pub creator_group: String,
}

fn default_known_nodes() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_keyspace() -> String {
    "admin_ks".to_string()
}

fn default_replication_factor() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_outbox_batch_size() -> i32 {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_admin_group() -> String {
    "Admin".to_string()
}

fn default_creator_group() -> String {
    "CreatingLicenseEnterpriseAllowed".to_string()
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            known_nodes: default_known_nodes(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
            cdc_enabled: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_outbox_batch_size(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_group: default_admin_group(),
            creator_group: default_creator_group(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: 2.0,
        }
    }
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("ADMIN")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scylla.known_nodes")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scylla.known_nodes.is_empty() {
            anyhow::bail!("scylla.known_nodes must list at least one node");
        }
        if self.scylla.keyspace.trim().is_empty() {
            anyhow::bail!("scylla.keyspace cannot be empty");
        }
        if self.http.port == 0 || self.metrics.port == 0 {
            anyhow::bail!("http.port and metrics.port must be non-zero");
        }
        if self.outbox.poll_interval_secs == 0 {
            anyhow::bail!("outbox.poll_interval_secs must be non-zero");
        }
        if self.outbox.batch_size < 1 {
            anyhow::bail!("outbox.batch_size must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.scylla.keyspace, "admin_ks");
        assert_eq!(settings.auth.admin_group, "Admin");
        assert_eq!(settings.http.port, 8080);
    }

    #[test]
    fn test_empty_node_list_rejected() {
        let mut settings = Settings::default();
        settings.scylla.known_nodes.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut settings = Settings::default();
        settings.outbox.poll_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_retry_settings_convert() {
        let retry = RetrySettings {
            max_attempts: 4,
            initial_delay_ms: 20,
            max_delay_ms: 500,
        };
        let config = retry.to_retry_config();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(20));
        assert_eq!(config.max_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let config = Config::builder()
            .set_override("http.port", 9000)
            .unwrap()
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.http.port, 9000);
        assert_eq!(settings.http.host, "0.0.0.0");
        assert_eq!(settings.metrics.port, 9090);
    }
}
