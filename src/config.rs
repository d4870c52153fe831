//! Configuration management for the Tesseract submitter
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Settings are loaded once at the binary boundary and passed by reference;
//! no library component reads the process environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "TESSERACT_SUBMITTER_CONFIG";

/// Longest confirmation wait accepted from configuration (one week)
pub const MAX_CONFIRMATION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_urls: Vec<String>,
    /// Expected chain id; checked against the node when set
    pub chain_id: Option<u64>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Percentage added on top of the suggested fee (0 = use as suggested)
    #[serde(default)]
    pub fee_buffer_percent: u64,
    /// Refuse to submit when the suggested fee exceeds this ceiling
    pub max_fee_per_unit_gwei: Option<u64>,
    /// How long the node's pending count may trail our own broadcasts
    /// before it is trusted again
    #[serde(default = "default_nonce_lag_tolerance_secs")]
    pub nonce_lag_tolerance_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_max_poll_failures")]
    pub max_consecutive_poll_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_progress_interval_ms() -> u64 {
    1_000
}

fn default_max_poll_failures() -> u32 {
    3
}

fn default_nonce_lag_tolerance_secs() -> u64 {
    60
}

fn default_private_key_env() -> String {
    "SUBMITTER_PRIVATE_KEY".to_string()
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            fee_buffer_percent: 0,
            max_fee_per_unit_gwei: None,
            nonce_lag_tolerance_secs: default_nonce_lag_tolerance_secs(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
            max_consecutive_poll_failures: default_max_poll_failures(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

impl SubmissionConfig {
    pub fn nonce_lag_tolerance(&self) -> Duration {
        Duration::from_secs(self.nonce_lag_tolerance_secs)
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_str, |name| std::env::var(name).ok())
    }

    /// Parse settings, resolving `${VAR}` placeholders through `lookup`
    pub fn from_toml_str<F>(input: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_str = substitute_env_vars(input, lookup);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            anyhow::bail!("At least one RPC URL must be configured");
        }
        if self.confirmation.poll_interval_ms == 0 {
            anyhow::bail!("confirmation.poll_interval_ms must be positive");
        }
        if self.confirmation.timeout_secs == 0 {
            anyhow::bail!("confirmation.timeout_secs must be positive");
        }
        if self.confirmation.timeout_secs > MAX_CONFIRMATION_TIMEOUT_SECS {
            anyhow::bail!(
                "confirmation.timeout_secs must not exceed {}",
                MAX_CONFIRMATION_TIMEOUT_SECS
            );
        }
        if self.confirmation.progress_interval_ms == 0 {
            anyhow::bail!("confirmation.progress_interval_ms must be positive");
        }
        if self.confirmation.poll_interval() > self.confirmation.timeout() {
            tracing::warn!(
                "Poll interval exceeds confirmation timeout - at most one poll will run"
            );
        }

        Ok(())
    }
}

lazy_static::lazy_static! {
    static ref ENV_PLACEHOLDER: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("placeholder pattern is valid");
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PLACEHOLDER
        .replace_all(input, |cap: &regex::Captures| {
            lookup(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}
