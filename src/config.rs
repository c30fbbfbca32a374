//! pinrelay configuration file handling
//!
//! Configuration is TOML, stored by default at
//! `<platform data dir>/pinrelay/config.toml` next to the node's data.
//!
//! ## Providers
//!
//! Remote providers are optional sections. A missing `[cloud]` or
//! `[companion]` section means that provider is not configured: it is absent
//! from pin results and status snapshots, not reported as failing.
//!
//! A `[cloud]` section with no token stays configured. Every call to it
//! then fails with a configuration error, which only affects that provider.
//! The token may also come from the `PINRELAY_CLOUD_TOKEN` environment
//! variable.

use crate::index::WELL_KNOWN_NAMESPACES;
use crate::orchestrator::LOCAL_PROVIDER;
use crate::remote::cloud::{CloudServiceConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::remote::{CompanionConfig, ConfirmationPolicy, DEFAULT_COMPANION_ADDRESS};
use crate::store::{NodeConfig, DEFAULT_FETCH_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable consulted when `[cloud] token` is unset.
pub const CLOUD_TOKEN_ENV: &str = "PINRELAY_CLOUD_TOKEN";

const DEFAULT_LOG_LEVEL: &str = "info";
const INDEX_DIR: &str = "index";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinrelayConfig {
    pub node: NodeSection,

    #[serde(default)]
    pub confirmation: ConfirmationSection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion: Option<CompanionSection>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Embedded node settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSection {
    /// Blocks, pin registry and persistent index live here.
    pub data_dir: PathBuf,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

/// Confirmation polling and status checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationSection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Bound on one provider check during reconciliation.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

/// Hosted pinning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSection {
    #[serde(default = "default_cloud_name")]
    pub name: String,

    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub resolves_by_reference: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Self-hosted companion node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionSection {
    #[serde(default = "default_companion_name")]
    pub name: String,

    #[serde(default = "default_companion_address")]
    pub address: String,

    #[serde(default)]
    pub resolves_by_reference: bool,

    /// Let the embedded node fetch missing blocks from the companion.
    #[serde(default = "default_true")]
    pub serve_blocks: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level (trace, debug, info, warn, error). `RUST_LOG` overrides.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_millis() as u64
}

fn default_attempts() -> u32 {
    crate::remote::poll::DEFAULT_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    crate::remote::poll::DEFAULT_DELAY.as_millis() as u64
}

fn default_check_timeout_ms() -> u64 {
    crate::reconcile::DEFAULT_CHECK_TIMEOUT.as_millis() as u64
}

fn default_cloud_name() -> String {
    "cloud".to_string()
}

fn default_companion_name() -> String {
    "companion".to_string()
}

fn default_companion_address() -> String {
    DEFAULT_COMPANION_ADDRESS.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            check_timeout_ms: default_check_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CloudSection {
    /// Token from the file, else from [`CLOUD_TOKEN_ENV`]. Blank values
    /// count as unset.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(CLOUD_TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

impl PinrelayConfig {
    /// Configuration with no remote providers.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            node: NodeSection {
                data_dir,
                fetch_timeout_ms: default_fetch_timeout_ms(),
            },
            confirmation: ConfirmationSection::default(),
            cloud: None,
            companion: None,
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PinrelayConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_file(path, &contents)
    }

    /// Provider names must be distinct, must not shadow `local`, and must be
    /// usable as index namespace components.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(cloud) = &self.cloud {
            if !cloud.endpoint.starts_with("http://") && !cloud.endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "[cloud] endpoint must be an http(s) URL, got '{}'",
                    cloud.endpoint
                )));
            }
            names.push(&cloud.name);
        }
        if let Some(companion) = &self.companion {
            names.push(&companion.name);
        }

        for (i, name) in names.iter().enumerate() {
            let plain = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !plain {
                return Err(ConfigError::Invalid(format!(
                    "provider name '{}' may only contain letters, digits, '-' and '_'",
                    name
                )));
            }
            if *name == LOCAL_PROVIDER {
                return Err(ConfigError::Invalid(format!(
                    "provider name '{}' is reserved",
                    LOCAL_PROVIDER
                )));
            }
            if names[..i].contains(name) {
                return Err(ConfigError::Invalid(format!(
                    "provider name '{}' is used twice",
                    name
                )));
            }
        }

        if self.confirmation.attempts == 0 {
            return Err(ConfigError::Invalid(
                "[confirmation] attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            data_dir: self.node.data_dir.clone(),
            fetch_timeout: Duration::from_millis(self.node.fetch_timeout_ms),
        }
    }

    /// Directory of the persistent index.
    pub fn index_dir(&self) -> PathBuf {
        self.node.data_dir.join(INDEX_DIR)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::new(
            self.confirmation.attempts,
            Duration::from_millis(self.confirmation.delay_ms),
        )
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation.check_timeout_ms)
    }

    pub fn cloud_service(&self) -> Option<CloudServiceConfig> {
        self.cloud.as_ref().map(|cloud| CloudServiceConfig {
            name: cloud.name.clone(),
            endpoint: cloud.endpoint.clone(),
            token: cloud.resolved_token(),
            resolves_by_reference: cloud.resolves_by_reference,
            request_timeout: Duration::from_millis(cloud.request_timeout_ms),
        })
    }

    pub fn companion_node(&self) -> Option<CompanionConfig> {
        self.companion.as_ref().map(|companion| CompanionConfig {
            name: companion.name.clone(),
            address: companion.address.clone(),
            resolves_by_reference: companion.resolves_by_reference,
            request_timeout: Duration::from_millis(companion.request_timeout_ms),
        })
    }

    /// Names of every configured remote provider, in orchestration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.cloud
            .iter()
            .map(|c| c.name.clone())
            .chain(self.companion.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// Generate default configuration content with comments.
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# pinrelay configuration
#
# Content is stored by the embedded node under [node] data_dir and
# replicated to every remote provider configured below. Providers whose
# section is absent are not configured and are skipped entirely.

[node]
# Blocks, pin registry and persistent index
data_dir = "{data_dir}"

# Bound on fetching a missing block from the network (milliseconds)
fetch_timeout_ms = {fetch_timeout_ms}

[confirmation]
# A pin only counts once a status query reports it pinned.
# Polling is bounded: attempts x delay.
attempts = {attempts}
delay_ms = {delay_ms}

# Bound on one provider check during status reconciliation (milliseconds)
check_timeout_ms = {check_timeout_ms}

# Hosted pinning service (optional)
# [cloud]
# name = "cloud"
# endpoint = "https://pins.example.com/v1"
# token = "..."             # or set {token_env}
# resolves_by_reference = true

# Self-hosted companion node (optional)
# [companion]
# name = "companion"
# address = "{companion_address}"
# serve_blocks = true       # embedded node fetches missing blocks from it

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "{level}"
"#,
            data_dir = data_dir.display(),
            fetch_timeout_ms = default_fetch_timeout_ms(),
            attempts = default_attempts(),
            delay_ms = default_delay_ms(),
            check_timeout_ms = default_check_timeout_ms(),
            token_env = CLOUD_TOKEN_ENV,
            companion_address = DEFAULT_COMPANION_ADDRESS,
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Write the commented default configuration.
    pub fn create_default(config_path: &Path, data_dir: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml(data_dir))
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

/// Namespaces the storage locator probes when the index cannot list its
/// own: the well-known set plus each configured provider's ledger.
pub fn fallback_namespaces(config: &PinrelayConfig) -> Vec<String> {
    let mut namespaces: Vec<String> = WELL_KNOWN_NAMESPACES.iter().map(|s| s.to_string()).collect();
    for name in config.provider_names() {
        let namespace = crate::remote::ledger_namespace(&name);
        if !namespaces.contains(&namespace) {
            namespaces.push(namespace);
        }
    }
    namespaces
}

/// Default data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pinrelay")
}

/// Default config file path.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}
