//! Configuration management for the cache

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials_file::CREDENTIALS_FILE_NAME;
use crate::expiry::{ExpiryPolicy, DEFAULT_CLOCK_SKEW_ALLOWANCE_SECS, DEFAULT_ROLE_MAP_CACHE_SECS};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Per-user configuration root holding `credentials` and `cache/`.
    /// Empty when no home directory is known; [`CacheConfig::validate`]
    /// rejects that.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Seconds before expiry at which tokens and credentials stop being used
    #[serde(default = "default_clock_skew_allowance")]
    pub clock_skew_allowance_secs: u32,

    /// Lifetime of a cached role map
    #[serde(default = "default_role_map_cache")]
    pub role_map_cache_secs: u32,
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".maws"))
        .unwrap_or_default()
}

fn default_clock_skew_allowance() -> u32 {
    DEFAULT_CLOCK_SKEW_ALLOWANCE_SECS
}

fn default_role_map_cache() -> u32 {
    DEFAULT_ROLE_MAP_CACHE_SECS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            clock_skew_allowance_secs: default_clock_skew_allowance(),
            role_map_cache_secs: default_role_map_cache(),
        }
    }
}

impl CacheConfig {
    /// Default settings under a specific root
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("MAWS_CACHE_ROOT") {
            config.root = PathBuf::from(root);
        }

        if let Some(secs) = parse_env_secs("MAWS_CLOCK_SKEW_ALLOWANCE")? {
            config.clock_skew_allowance_secs = secs;
        }

        if let Some(secs) = parse_env_secs("MAWS_ROLE_MAP_CACHE_TIME")? {
            config.role_map_cache_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("maws").join("cache.yaml"))
    }

    /// Load from default locations (file first, then env)
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_config_path() {
            Some(config_path) if config_path.exists() => Self::from_file(&config_path),
            _ => Self::from_env(),
        }
    }

    /// The root must be an absolute path. A relative one would follow the
    /// working directory, and an empty one means no home directory was found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::NoRoot);
        }
        if !self.root.is_absolute() {
            return Err(ConfigError::RelativeRoot(self.root.clone()));
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join(CREDENTIALS_FILE_NAME)
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(self.clock_skew_allowance_secs, self.role_map_cache_secs)
    }
}

fn parse_env_secs(name: &str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration root: home directory unknown and MAWS_CACHE_ROOT not set")]
    NoRoot,
    #[error("Configuration root must be an absolute path: {}", .0.display())]
    RelativeRoot(PathBuf),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
