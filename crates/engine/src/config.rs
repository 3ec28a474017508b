//! Server configuration via `testsync.toml`
//!
//! The config file lives in the config directory passed on the command
//! line. On first start a commented default is written there; to change
//! settings, edit the file and restart.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use testsync_core::{Error, Result};
pub use testsync_storage::StorageConfig;

/// Config file name placed in the config directory.
pub const CONFIG_FILE_NAME: &str = "testsync.toml";

/// Log file name placed in `logging.dir`.
pub const LOG_FILE_NAME: &str = "test-sync.log";

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level name or `RUST_LOG`-style directive string.
    #[serde(default = "default_level")]
    pub level: String,
    /// Directory the log file is written to.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    ".".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: default_log_dir(),
        }
    }
}

impl LoggingConfig {
    /// Full path of the log file.
    pub fn file_path(&self) -> std::path::PathBuf {
        Path::new(&self.dir).join(LOG_FILE_NAME)
    }
}

/// `[sync_client]` section: basic-auth credentials clients must present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Expected username
    #[serde(default)]
    pub username: String,
    /// Expected password
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// No credentials configured; authentication is disabled.
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    /// Whether a client-supplied pair is accepted.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.is_empty() || (self.username == username && self.password == password)
    }
}

/// `[cleanup]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_cleanup_secs")]
    pub interval_secs: u64,
    /// Tests older than this many seconds are evicted.
    #[serde(default = "default_cleanup_secs")]
    pub retention_secs: u64,
}

fn default_cleanup_secs() -> u64 {
    12 * 60 * 60
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_secs(),
            retention_secs: default_cleanup_secs(),
        }
    }
}

/// Server configuration loaded from `testsync.toml`.
///
/// # Example
///
/// ```toml
/// http_port = 9104
/// ws_port = 9105
///
/// [sync_client]
/// username = "runner"
/// password = "secret"
///
/// [storage]
/// type = "sqlite"
/// sqlite_path = "/var/lib/testsync/testsync.db"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port of the HTTP payload API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Port of the WebSocket endpoint.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// Seconds between keepalive pings on registered connections.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Client credentials.
    #[serde(default)]
    pub sync_client: Credentials,
    /// Data store backend.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Eviction sweep.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

fn default_http_port() -> u16 {
    9104
}

fn default_ws_port() -> u16 {
    9105
}

fn default_keepalive_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            ws_port: default_ws_port(),
            keepalive_secs: default_keepalive_secs(),
            logging: LoggingConfig::default(),
            sync_client: Credentials::default(),
            storage: StorageConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# testsync server configuration

# Port of the HTTP payload API (POST/GET /tests/{test_id})
http_port = 9104

# Port of the WebSocket endpoint (/register/{test_id})
ws_port = 9105

# Seconds between keepalive pings on registered connections
keepalive_secs = 10

[logging]
# Level name ("trace", "debug", "info", "warn", "error") or a
# RUST_LOG-style directive string such as "testsync=debug,info"
level = "info"
# Directory for test-sync.log; stderr is used if it cannot be opened
dir = "."

# Basic-auth credentials clients must present.
# Leave both empty to disable authentication.
[sync_client]
username = ""
password = ""

[storage]
# "memory" (default, lost on restart) or "sqlite"
type = "memory"
sqlite_path = "testsync.db"

[cleanup]
# Seconds between eviction sweeps (default 12h)
interval_secs = 43200
# Tests and payloads older than this are removed (default 12h)
retention_secs = 43200
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ServerConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `testsync.toml` from `dir`, writing the default first if absent.
    pub fn load_or_init(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Config(format!(
                "Failed to create config directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        let path = dir.join(CONFIG_FILE_NAME);
        Self::write_default_if_missing(&path)?;
        Self::from_file(&path)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Check values serde cannot.
    ///
    /// The log level itself is checked when the subscriber is installed.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_secs == 0 {
            return Err(Error::Config("keepalive_secs must be positive".to_string()));
        }
        if self.cleanup.interval_secs == 0 {
            return Err(Error::Config(
                "cleanup.interval_secs must be positive".to_string(),
            ));
        }
        if self.http_port != 0 && self.http_port == self.ws_port {
            return Err(Error::Config(format!(
                "http_port and ws_port must differ (both {})",
                self.http_port
            )));
        }
        Ok(())
    }

    /// Interval between keepalive pings.
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Interval between eviction sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_secs)
    }

    /// Age past which tests are evicted.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.cleanup.retention_secs)
    }
}
