//! Staging service configuration file handling
//!
//! Provides default configuration generation and loading for the staging
//! service. Configuration files are TOML and live in the service data
//! directory next to the database.
//!
//! Durations use humantime syntax (`"30s"`, `"2m"`).

use pln_staging::deposit::{ChecksumAlgorithm, ChecksumPolicy};
use pln_staging::gatekeeper::probe::DEFAULT_MAX_BODY_BYTES;
use pln_staging::gatekeeper::SweepSettings;
use pln_staging::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default minimum platform release for automatic whitelisting
const DEFAULT_MIN_VERSION: &str = "3.1.2";

/// Staging service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Database location
    pub store: StoreConfig,

    /// Trust sweep and journal probing
    #[serde(default)]
    pub trust: TrustConfig,

    /// Deposit processing
    #[serde(default)]
    pub deposits: DepositsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database
    pub path: PathBuf,
}

/// Trust sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Minimum platform release for automatic whitelisting
    #[serde(default = "default_min_version")]
    pub min_version: String,

    /// Timeout for one ping request
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,

    /// Maximum pings in flight during a sweep
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,

    /// User agent sent with pings
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Largest ping response accepted
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Retries for the on-demand `probe` command
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,

    /// First retry delay (doubles per retry)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: String,

    /// Retry delay cap
    #[serde(default = "default_retry_max_backoff")]
    pub retry_max_backoff: String,
}

/// Deposit processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositsConfig {
    /// Directory packages are built in
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Checksum algorithms accepted from journals and for packages
    #[serde(default = "default_accepted_checksums")]
    pub accepted_checksums: Vec<String>,

    /// Algorithm used to seal built packages
    #[serde(default = "default_package_checksum")]
    pub package_checksum: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_min_version() -> String {
    DEFAULT_MIN_VERSION.to_string()
}

fn default_probe_timeout() -> String {
    "30s".to_string()
}

fn default_probe_concurrency() -> usize {
    8
}

fn default_user_agent() -> String {
    format!("pln-staging/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_probe_retries() -> u32 {
    3
}

fn default_retry_backoff() -> String {
    "2s".to_string()
}

fn default_retry_max_backoff() -> String {
    "1m".to_string()
}

fn default_staging_dir() -> PathBuf {
    default_data_dir().join("staged")
}

fn default_accepted_checksums() -> Vec<String> {
    vec!["SHA-1".to_string(), "MD5".to_string()]
}

fn default_package_checksum() -> String {
    "SHA-1".to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            min_version: default_min_version(),
            probe_timeout: default_probe_timeout(),
            probe_concurrency: default_probe_concurrency(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
            probe_retries: default_probe_retries(),
            retry_backoff: default_retry_backoff(),
            retry_max_backoff: default_retry_max_backoff(),
        }
    }
}

impl Default for DepositsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            accepted_checksums: default_accepted_checksums(),
            package_checksum: default_package_checksum(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    humantime::parse_duration(value)
        .map_err(|e| format!("Invalid duration for {}: {:?}: {}", field, value, e).into())
}

impl StagingConfig {
    /// Create a configuration keeping everything under `data_dir`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            store: StoreConfig {
                path: data_dir.join("staging.db"),
            },
            trust: TrustConfig::default(),
            deposits: DepositsConfig {
                staging_dir: data_dir.join("staged"),
                ..DepositsConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: StagingConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Check every value that is only parsed on use, so a bad file fails at
    /// load time.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.probe_timeout()?;
        self.retry_policy()?;
        self.checksum_policy()?;
        self.package_algorithm()?;
        pln_staging::gatekeeper::Version::parse(&self.trust.min_version)?;
        if self.trust.probe_concurrency == 0 {
            return Err("trust.probe_concurrency must be at least 1".into());
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Result<Duration, Box<dyn std::error::Error>> {
        parse_duration("trust.probe_timeout", &self.trust.probe_timeout)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, Box<dyn std::error::Error>> {
        Ok(RetryPolicy {
            max_retries: self.trust.probe_retries,
            base: parse_duration("trust.retry_backoff", &self.trust.retry_backoff)?,
            max_backoff: parse_duration("trust.retry_max_backoff", &self.trust.retry_max_backoff)?,
        })
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            default_min_version: self.trust.min_version.clone(),
            concurrency: self.trust.probe_concurrency,
        }
    }

    pub fn checksum_policy(&self) -> Result<ChecksumPolicy, Box<dyn std::error::Error>> {
        Ok(ChecksumPolicy::from_labels(&self.deposits.accepted_checksums)?)
    }

    pub fn package_algorithm(&self) -> Result<ChecksumAlgorithm, Box<dyn std::error::Error>> {
        let algorithm: ChecksumAlgorithm = self.deposits.package_checksum.parse()?;
        if !self.checksum_policy()?.accepts(algorithm) {
            return Err(format!(
                "deposits.package_checksum {} is not in deposits.accepted_checksums",
                algorithm
            )
            .into());
        }
        Ok(algorithm)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# PLN Staging Service Configuration
#
# Durations use humantime syntax: "500ms", "30s", "2m".

[store]
# SQLite database holding journals, admission lists, deposits and the audit trail
path = "{db_path}"

[trust]
# Minimum platform release a journal must report to be whitelisted by a sweep.
# Overridden per run by `pln-staging sweep <MIN_VERSION>`.
min_version = "{min_version}"

# Timeout for one ping request
probe_timeout = "30s"

# Maximum pings in flight during a sweep
probe_concurrency = 8

# Largest ping response accepted, in bytes
max_body_bytes = {max_body_bytes}

# Retries for the on-demand `probe` command (network failures only)
probe_retries = 3
retry_backoff = "2s"
retry_max_backoff = "1m"

[deposits]
# Directory packages are built in
staging_dir = "{staging_dir}"

# Checksum algorithms accepted from journals: SHA-1, MD5, SHA-256
accepted_checksums = ["SHA-1", "MD5"]

# Algorithm used to seal built packages (must be accepted above)
package_checksum = "SHA-1"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/pln-staging/staging.log"
"#,
            db_path = data_dir.join("staging.db").display(),
            min_version = DEFAULT_MIN_VERSION,
            max_body_bytes = DEFAULT_MAX_BODY_BYTES,
            staging_dir = data_dir.join("staged").display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        data_dir: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pln-staging")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}
