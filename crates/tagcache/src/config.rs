use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::entry::{ExpireAge, TtlPolicy};
use crate::selector::ProbeMode;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Shared remote tier
    #[serde(default)]
    pub remote: RemoteConfig,
    /// In-process fallback tier
    #[serde(default)]
    pub local: LocalConfig,
    /// Stale/expiry ages for cached values
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Remote validations
        if self.remote.enabled && self.remote.url.trim().is_empty() {
            return Err("remote.enabled=true requires remote.url".into());
        }
        if self.remote.pool_size == 0 {
            return Err("remote.pool_size must be > 0".into());
        }
        if self.remote.connect_timeout_ms == 0 {
            return Err("remote.connect_timeout_ms must be > 0".into());
        }
        if self.remote.op_timeout_ms == 0 || self.remote.op_timeout_ms >= 1000 {
            return Err("remote.op_timeout_ms must be between 1 and 999".into());
        }
        if self.remote.key_prefix.is_empty() {
            return Err("remote.key_prefix must not be empty".into());
        }
        if self.remote.probe_interval_secs == Some(0) {
            return Err("remote.probe_interval_secs must be > 0 when set".into());
        }
        // Local validations
        if self.local.capacity == 0 {
            return Err("local.capacity must be > 0".into());
        }
        // TTL validations
        if self.ttl.default_stale_secs == 0 {
            return Err("ttl.default_stale_secs must be > 0".into());
        }
        if !self.ttl.expire_multiplier.is_finite() || self.ttl.expire_multiplier < 1.0 {
            return Err("ttl.expire_multiplier must be a finite number >= 1.0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Remote (Redis) tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Enable the remote tier (gracefully degrades without it)
    /// Default: false (local tier only)
    #[serde(default = "default_remote_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_remote_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_remote_pool_size")]
    pub pool_size: usize,

    /// Startup connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-operation timeout in milliseconds (sub-second)
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Namespace prepended to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Retry the connection on this interval while running on the local
    /// tier. Unset: probe only at startup.
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
}

fn default_remote_enabled() -> bool {
    false
}

fn default_remote_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_remote_pool_size() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_op_timeout_ms() -> u64 {
    500
}

fn default_key_prefix() -> String {
    "tagcache:".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_remote_enabled(),
            url: default_remote_url(),
            pool_size: default_remote_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
            key_prefix: default_key_prefix(),
            probe_interval_secs: None,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn probe_mode(&self) -> ProbeMode {
        match self.probe_interval_secs {
            Some(secs) if secs > 0 => ProbeMode::Interval(Duration::from_secs(secs)),
            _ => ProbeMode::Startup,
        }
    }
}

/// Local LRU tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Maximum number of entries
    #[serde(default = "default_local_capacity")]
    pub capacity: usize,
}

fn default_local_capacity() -> usize {
    1000
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            capacity: default_local_capacity(),
        }
    }
}

/// TTL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Age in seconds after which a value is served stale and refreshed
    #[serde(default = "default_stale_secs")]
    pub default_stale_secs: u64,

    /// Hard expiry age as a multiple of the stale age
    #[serde(default = "default_expire_multiplier")]
    pub expire_multiplier: f64,
}

fn default_stale_secs() -> u64 {
    300
}

fn default_expire_multiplier() -> f64 {
    1.5
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default_stale_secs: default_stale_secs(),
            expire_multiplier: default_expire_multiplier(),
        }
    }
}

impl TtlConfig {
    pub fn policy(&self) -> TtlPolicy {
        TtlPolicy::new(
            Duration::from_secs(self.default_stale_secs),
            ExpireAge::Multiplier(self.expire_multiplier),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::CacheConfig;
    use crate::error::ConfigError;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Load configuration from an optional TOML file and `TAGCACHE__*`
    /// environment overrides, then validate it.
    pub fn load_config(path: Option<&str>) -> Result<CacheConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("tagcache.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., TAGCACHE__REMOTE__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("TAGCACHE")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: CacheConfig = builder.build()?.try_deserialize()?;
        merged.validate().map_err(ConfigError::Invalid)?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.remote.enabled);
        assert_eq!(config.remote.op_timeout(), Duration::from_millis(500));
        assert_eq!(config.remote.probe_mode(), ProbeMode::Startup);
        assert_eq!(
            config.ttl.policy().ages(None),
            (Duration::from_secs(300), Duration::from_secs(450))
        );
    }

    #[test]
    fn test_rejects_second_long_op_timeout() {
        let mut config = CacheConfig::default();
        config.remote.op_timeout_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_shrinking_expiry() {
        let mut config = CacheConfig::default();
        config.ttl.expire_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[remote]
enabled = true
url = "redis://cache.internal:6380"
op_timeout_ms = 250
probe_interval_secs = 30

[local]
capacity = 64

[ttl]
default_stale_secs = 60
expire_multiplier = 2.0
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = loader::load_config(Some(&path)).unwrap();
        assert!(config.remote.enabled);
        assert_eq!(config.remote.url, "redis://cache.internal:6380");
        assert_eq!(config.remote.op_timeout_ms, 250);
        assert_eq!(config.remote.connect_timeout_ms, 5000);
        assert_eq!(
            config.remote.probe_mode(),
            ProbeMode::Interval(Duration::from_secs(30))
        );
        assert_eq!(config.local.capacity, 64);
        assert_eq!(
            config.ttl.policy().ages(None),
            (Duration::from_secs(60), Duration::from_secs(120))
        );
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[local]\ncapacity = 0").unwrap();
        let path = file.path().to_string_lossy().to_string();
        assert!(matches!(
            loader::load_config(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }
}
