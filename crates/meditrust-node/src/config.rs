//! Configuration file management.
//!
//! `config.toml` lives in the data directory. Every field has a default, so a
//! missing file or a partial one is fine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use meditrust_engine::config::DEFAULT_REQUEST_TTL_HOURS;
use meditrust_engine::EngineConfig;
use meditrust_types::{ApprovalPolicy, DEFAULT_EXPIRY_YEARS, MAX_EXPIRY_YEARS, MIN_EXPIRY_YEARS};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "MEDITRUST_DATA_DIR";

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Record lifetime when a caller does not give one (1-30).
    #[serde(default = "default_expiry_years")]
    pub default_expiry_years: u32,
    /// Audit the whole chain when the node starts.
    #[serde(default = "default_true")]
    pub verify_on_startup: bool,
    /// Exit instead of serving when the startup audit fails. Implies
    /// `verify_on_startup`.
    #[serde(default)]
    pub refuse_invalid_chain: bool,
}

/// Approval workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Pending requests expire after this many hours.
    #[serde(default = "default_request_ttl_hours")]
    pub request_ttl_hours: u64,
    /// "standing" | "single_use".
    #[serde(default)]
    pub approval_policy: ApprovalPolicy,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error". `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_expiry_years() -> u32 {
    DEFAULT_EXPIRY_YEARS
}

fn default_true() -> bool {
    true
}

fn default_request_ttl_hours() -> u64 {
    DEFAULT_REQUEST_TTL_HOURS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_expiry_years: default_expiry_years(),
            verify_on_startup: true,
            refuse_invalid_chain: false,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            request_ttl_hours: default_request_ttl_hours(),
            approval_policy: ApprovalPolicy::default(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let years = self.ledger.default_expiry_years;
        if !(MIN_EXPIRY_YEARS..=MAX_EXPIRY_YEARS).contains(&years) {
            anyhow::bail!(
                "ledger.default_expiry_years must be within {MIN_EXPIRY_YEARS}..={MAX_EXPIRY_YEARS}, got {years}"
            );
        }
        if self.access.request_ttl_hours == 0 {
            anyhow::bail!("access.request_ttl_hours must be positive");
        }
        Ok(())
    }

    /// The engine settings this file describes.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_expiry_years: self.ledger.default_expiry_years,
            request_ttl_secs: self.access.request_ttl_hours.saturating_mul(3600),
            approval_policy: self.access.approval_policy,
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/MediTrust")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".meditrust")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/meditrust"))
}
