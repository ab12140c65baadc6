//! Configuration for the gateway and its backend
//!
//! All knobs the core honors live here: per-resource cache capacity and TTL,
//! per-operation-class minimum intervals, retry tuning, and backend
//! connection settings. Loaded from YAML under the home directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheCapacity, CacheTtl};
use crate::error::{ConfigError, ErrorKind, Result};
use crate::retry::RetryPolicy;
use crate::throttle::ThrottleIntervals;

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Remote backend connection settings
    #[serde(default)]
    pub backend: BackendSettings,

    /// Per-resource cache tuning
    #[serde(default)]
    pub caches: CacheSettings,

    /// Per-operation-class pacing
    #[serde(default)]
    pub throttle: ThrottleSettings,

    /// Backoff retrier tuning
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Remote backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the row-store service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key exchanged for a session token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Spreadsheet holding the orders and inventory tabs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,

    /// File-storage folder receiving payment attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments_folder_id: Option<String>,

    /// Per-request transport timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://rowstore.example.com/api/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            spreadsheet_id: None,
            attachments_folder_id: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendSettings {
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingApiKey.into())
    }

    pub fn require_spreadsheet_id(&self) -> Result<&str> {
        self.spreadsheet_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSpreadsheetId.into())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Capacity and freshness window for one cache instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTuning {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheTuning {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Per-resource cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub inventory: CacheTuning,
    pub orders: CacheTuning,
    pub sheets: CacheTuning,
    pub drive: CacheTuning,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            inventory: CacheTuning {
                capacity: CacheCapacity::INVENTORY,
                ttl_secs: CacheTtl::INVENTORY.as_secs(),
            },
            orders: CacheTuning {
                capacity: CacheCapacity::ORDERS,
                ttl_secs: CacheTtl::ORDERS.as_secs(),
            },
            sheets: CacheTuning {
                capacity: CacheCapacity::SHEETS,
                ttl_secs: CacheTtl::SHEET_METADATA.as_secs(),
            },
            drive: CacheTuning {
                capacity: CacheCapacity::DRIVE,
                ttl_secs: CacheTtl::DRIVE.as_secs(),
            },
        }
    }
}

/// Minimum spacing between backend calls, per operation class, in millis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub sheets_ms: u64,
    pub sheets_read_ms: u64,
    pub sheets_write_ms: u64,
    pub inventory_ms: u64,
    pub drive_ms: u64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        let intervals = ThrottleIntervals::default();
        Self {
            sheets_ms: intervals.sheets.as_millis() as u64,
            sheets_read_ms: intervals.sheets_read.as_millis() as u64,
            sheets_write_ms: intervals.sheets_write.as_millis() as u64,
            inventory_ms: intervals.inventory.as_millis() as u64,
            drive_ms: intervals.drive.as_millis() as u64,
        }
    }
}

impl ThrottleSettings {
    pub fn intervals(&self) -> ThrottleIntervals {
        ThrottleIntervals {
            sheets: Duration::from_millis(self.sheets_ms),
            sheets_read: Duration::from_millis(self.sheets_read_ms),
            sheets_write: Duration::from_millis(self.sheets_write_ms),
            inventory: Duration::from_millis(self.inventory_ms),
            drive: Duration::from_millis(self.drive_ms),
        }
    }
}

/// Backoff retrier tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries beyond the first try
    pub max_attempts: u32,

    /// Delay before the first retry, in millis
    pub base_delay_ms: u64,

    /// Error kinds worth another attempt
    pub retry_on: Vec<ErrorKind>,

    /// Randomize backoff sleeps
    pub jitter: bool,

    /// Overall budget per retried operation, in millis; unset means no bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            retry_on: policy.retry_on,
            jitter: policy.jitter,
            deadline_ms: None,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            retry_on: self.retry_on.clone(),
            jitter: self.jitter,
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

impl GatewayConfig {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".sheetgate").join("config.yaml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: GatewayConfig =
            serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // The file carries the API key; keep it private on unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }
}
