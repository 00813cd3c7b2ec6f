use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::SessionOptions;

/// `DBMIRROR_SOURCE_{HOST,PORT,USER,PASSWORD,DATABASE}`
pub const SOURCE_ENV_PREFIX: &str = "DBMIRROR_SOURCE";
/// `DBMIRROR_TARGET_{HOST,PORT,USER,PASSWORD,DATABASE}`
pub const TARGET_ENV_PREFIX: &str = "DBMIRROR_TARGET";
pub const ADMIN_TOKEN_ENV: &str = "DBMIRROR_AUTH_TOKEN_ADMIN";
pub const READONLY_TOKEN_ENV: &str = "DBMIRROR_AUTH_TOKEN_READONLY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub source: DatabaseConfig,
    pub target: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    /// Bearer token allowed to start and stop runs.
    pub admin_token: Option<String>,
    /// Bearer token allowed to read status, health and metrics only.
    pub readonly_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Daily trigger time, in the host's local time zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum rows per multi-row INSERT.
    pub insert_batch_size: usize,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8000".to_string(),
            admin_token: None,
            readonly_token: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "db_name".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 0,
            minute: 0,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            insert_batch_size: 500,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let var = |name: &str| std::env::var(format!("{prefix}_{name}")).ok();

        if let Some(v) = var("HOST") {
            self.host = v;
        }
        if let Some(v) = var("PORT") {
            self.port = v.parse().map_err(|_| {
                ConfigError::Invalid(format!("{prefix}_PORT '{v}' is not a port number"))
            })?;
        }
        if let Some(v) = var("USER") {
            self.user = v;
        }
        if let Some(v) = var("PASSWORD") {
            self.password = v;
        }
        if let Some(v) = var("DATABASE") {
            self.database = v;
        }
        Ok(())
    }
}

impl SyncConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            insert_batch_size: self.insert_batch_size,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or defaults when no path is given,
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Connection settings and tokens may come from the environment, which
    /// also allows running without a config file.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.source.apply_env_overrides(SOURCE_ENV_PREFIX)?;
        self.target.apply_env_overrides(TARGET_ENV_PREFIX)?;
        if let Ok(v) = std::env::var(ADMIN_TOKEN_ENV) {
            self.server.admin_token = Some(v);
        }
        if let Ok(v) = std::env::var(READONLY_TOKEN_ENV) {
            self.server.readonly_token = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(ConfigError::Invalid(format!(
                "schedule time {:02}:{:02} is out of range",
                self.schedule.hour, self.schedule.minute
            )));
        }
        if self.sync.insert_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "sync.insert_batch_size must be at least 1".to_string(),
            ));
        }
        if self.server.address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.address '{}' is not a socket address",
                self.server.address
            )));
        }
        if self.source.host == self.target.host
            && self.source.port == self.target.port
            && self.source.database == self.target.database
        {
            return Err(ConfigError::Invalid(
                "source and target point at the same database".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) static TEST_ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn clear_env() {
        for prefix in [SOURCE_ENV_PREFIX, TARGET_ENV_PREFIX] {
            for name in ["HOST", "PORT", "USER", "PASSWORD", "DATABASE"] {
                unsafe { std::env::remove_var(format!("{prefix}_{name}")) };
            }
        }
        unsafe {
            std::env::remove_var(ADMIN_TOKEN_ENV);
            std::env::remove_var(READONLY_TOKEN_ENV);
        }
    }

    const SAMPLE: &str = r#"
[server]
address = "127.0.0.1:9100"

[source]
host = "primary.internal"
user = "replicator"
database = "shop"

[target]
host = "replica.internal"
port = 3307
database = "shop"

[schedule]
hour = 3
minute = 30
"#;

    #[test]
    fn database_defaults_match_classic_setup() {
        let db = DatabaseConfig::default();
        assert_eq!(db.host, "localhost");
        assert_eq!(db.port, 3306);
        assert_eq!(db.user, "root");
        assert!(db.password.is_empty());
        assert_eq!(db.database, "db_name");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg = Config::from_toml(SAMPLE).expect("parse");
        assert_eq!(cfg.server.address, "127.0.0.1:9100");
        assert_eq!(cfg.source.host, "primary.internal");
        assert_eq!(cfg.source.port, 3306);
        assert_eq!(cfg.target.port, 3307);
        assert_eq!(cfg.target.user, "root");
        assert!(cfg.schedule.enabled);
        assert_eq!((cfg.schedule.hour, cfg.schedule.minute), (3, 30));
        assert_eq!(cfg.sync.insert_batch_size, 500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_config_is_rejected_because_both_sides_match() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("same database"));
    }

    #[test]
    fn out_of_range_schedule_is_rejected() {
        let mut cfg = Config::from_toml(SAMPLE).expect("parse");
        cfg.schedule.hour = 24;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reads_file_and_applies_env_overrides() {
        let _lock = TEST_ENV_LOCK.lock().unwrap();
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(SAMPLE.as_bytes()).expect("write");

        clear_env();
        unsafe {
            std::env::set_var("DBMIRROR_SOURCE_PASSWORD", "from-env");
            std::env::set_var(ADMIN_TOKEN_ENV, "admin-secret");
        }

        let cfg = Config::load(Some(file.path())).expect("load");
        clear_env();

        assert_eq!(cfg.source.password, "from-env");
        assert!(cfg.target.password.is_empty());
        assert_eq!(cfg.server.admin_token.as_deref(), Some("admin-secret"));
        assert_eq!(cfg.server.readonly_token, None);
    }

    #[test]
    fn load_without_file_uses_environment() {
        let _lock = TEST_ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(Config::load(None).is_err());

        unsafe {
            std::env::set_var("DBMIRROR_SOURCE_HOST", "primary.internal");
            std::env::set_var("DBMIRROR_SOURCE_DATABASE", "shop");
            std::env::set_var("DBMIRROR_TARGET_HOST", "replica.internal");
            std::env::set_var("DBMIRROR_TARGET_PORT", "3307");
            std::env::set_var("DBMIRROR_TARGET_USER", "mirror");
            std::env::set_var("DBMIRROR_TARGET_DATABASE", "shop");
        }
        let cfg = Config::load(None);
        clear_env();

        let cfg = cfg.expect("load from env");
        assert_eq!(cfg.source.host, "primary.internal");
        assert_eq!(cfg.source.port, 3306);
        assert_eq!(cfg.target.host, "replica.internal");
        assert_eq!(cfg.target.port, 3307);
        assert_eq!(cfg.target.user, "mirror");
        assert_eq!(cfg.target.database, "shop");
    }

    #[test]
    fn bad_port_in_environment_is_rejected() {
        let _lock = TEST_ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("DBMIRROR_SOURCE_PORT", "not-a-port");
        }
        let err = Config::load(None).unwrap_err();
        clear_env();
        assert!(err.to_string().contains("DBMIRROR_SOURCE_PORT"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/dbmirror.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn session_options_follow_sync_section() {
        let sync = SyncConfig {
            insert_batch_size: 42,
            connect_timeout_secs: 3,
        };
        let opts = sync.session_options();
        assert_eq!(opts.insert_batch_size, 42);
        assert_eq!(opts.connect_timeout, Duration::from_secs(3));
    }
}
