//! Application configuration, read from TOML with environment overrides.
//!
//! ```toml
//! [app]
//! name = "Blog"
//! env = "production"        # "development" / "local" relax the CSP
//! debug = false
//! middleware = ["trace", "session"]
//!
//! [server]
//! addr = "0.0.0.0:3000"
//!
//! [database]
//! url = "sqlite://blog.db"
//! max_connections = 5
//!
//! [session]
//! cookie = "hearth_session"
//!
//! [admin]
//! login_path = "/admin/login"
//! session_timeout = "1h"
//!
//! [logging]
//! filter = "info,sqlx=warn"
//! format = "json"
//! file = "storage/logs/app.log"
//! ```
//!
//! Every key is optional. Environment variables (`APP_NAME`, `APP_ENV`,
//! `APP_DEBUG`, `DATABASE_URL`, `LOG_FILTER`) win over the file when
//! [`Config::with_env`] is applied.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_name")]
    pub name: String,
    /// `production`, `development`, `local`, …
    #[serde(default = "AppConfig::default_env")]
    pub env: String,
    /// Show error details in 500 responses.
    #[serde(default)]
    pub debug: bool,
    /// Global middleware, outermost first.
    #[serde(default)]
    pub middleware: Vec<String>,
}

impl AppConfig {
    fn default_name() -> String {
        String::from("hearth")
    }
    fn default_env() -> String {
        String::from("production")
    }

    pub fn is_development(&self) -> bool {
        matches!(self.env.as_str(), "development" | "local")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { name: Self::default_name(), env: Self::default_env(), debug: false, middleware: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_addr")]
    pub addr: String,
}

impl ServerConfig {
    fn default_addr() -> String {
        String::from("0.0.0.0:3000")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: Self::default_addr() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite://blog.db` or `sqlite::memory:`.
    #[serde(default = "DatabaseConfig::default_url")]
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn default_url() -> String {
        String::from("sqlite::memory:")
    }
    fn default_max_connections() -> u32 {
        5
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: Self::default_url(), max_connections: Self::default_max_connections() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_cookie")]
    pub cookie: String,
}

impl SessionConfig {
    fn default_cookie() -> String {
        String::from("hearth_session")
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { cookie: Self::default_cookie() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Where the `admin` middleware sends unauthenticated visitors.
    #[serde(default = "AdminConfig::default_login_path")]
    pub login_path: String,
    /// Idle time after which an admin session is signed out, e.g. `"30m"`.
    #[serde(default = "AdminConfig::default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,
}

impl AdminConfig {
    fn default_login_path() -> String {
        String::from("/admin/login")
    }
    fn default_session_timeout() -> Duration {
        Duration::from_secs(3600)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { login_path: Self::default_login_path(), session_timeout: Self::default_session_timeout() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives.
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also append plain-text log lines to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_filter() -> String {
        String::from("info")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: Self::default_filter(), format: LogFormat::default(), file: None }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Applies overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = lookup("APP_NAME") {
            self.app.name = name;
        }
        if let Some(env) = lookup("APP_ENV") {
            self.app.env = env;
        }
        if let Some(raw) = lookup("APP_DEBUG") {
            match parse_bool(&raw) {
                Some(enabled) => self.app.debug = enabled,
                None => warn!(value = %raw, "ignoring unrecognised APP_DEBUG"),
            }
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            self.logging.filter = filter;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.name.trim().is_empty() {
            return Err(Error::Config("app.name must not be empty".into()));
        }
        self.server
            .addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("server.addr `{}`: {e}", self.server.addr)))?;
        if !self.database.url.starts_with("sqlite:") {
            return Err(Error::Config("database.url must start with sqlite:".into()));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config("database.max_connections must be > 0".into()));
        }
        let cookie = &self.session.cookie;
        if cookie.is_empty() || !cookie.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(Error::Config(format!("session.cookie `{cookie}` is not a valid cookie name")));
        }
        if !self.admin.login_path.starts_with('/') {
            return Err(Error::Config("admin.login_path must start with /".into()));
        }
        if self.admin.session_timeout.is_zero() {
            return Err(Error::Config("admin.session_timeout must be > 0".into()));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(Error::Config("logging.filter must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.app.env, "production");
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert_eq!(config.admin.session_timeout, Duration::from_secs(3600));
        assert_eq!(config.logging.format, LogFormat::Text);
        config.validate().unwrap();
    }

    #[test]
    fn sections_parse() {
        let config = Config::from_toml_str(
            r#"
            [app]
            env = "local"
            debug = true
            middleware = ["trace", "session"]

            [admin]
            login_path = "/admin/acme/login"
            session_timeout = "30m"

            [logging]
            format = "json"
            file = "storage/logs/app.log"
            "#,
        )
        .unwrap();
        assert!(config.app.is_development());
        assert!(config.app.debug);
        assert_eq!(config.app.middleware, ["trace", "session"]);
        assert_eq!(config.admin.session_timeout, Duration::from_secs(1800));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.file.as_deref(), Some(Path::new("storage/logs/app.log")));
    }

    #[test]
    fn environment_wins() {
        let env = HashMap::from([
            ("APP_ENV", "development"),
            ("APP_DEBUG", "yes"),
            ("DATABASE_URL", "sqlite://override.db"),
        ]);
        let config = Config::default().with_env_from(|k| env.get(k).map(|v| (*v).to_owned()));
        assert_eq!(config.app.env, "development");
        assert!(config.app.debug);
        assert_eq!(config.database.url, "sqlite://override.db");
        assert_eq!(config.app.name, "hearth");
    }

    #[test]
    fn unrecognised_debug_flag_is_ignored() {
        let mut config = Config::default();
        config.app.debug = true;
        let config = config.with_env_from(|k| (k == "APP_DEBUG").then(|| "maybe".to_owned()));
        assert!(config.app.debug);

        let config = config.with_env_from(|k| (k == "APP_DEBUG").then(|| "off".to_owned()));
        assert!(!config.app.debug);
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = Config::default();
        config.server.addr = "nowhere".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.database.url = "mysql://localhost/blog".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.cookie = "a b;".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn syntax_errors_are_config_errors() {
        assert!(matches!(Config::from_toml_str("[app"), Err(Error::Config(_))));
    }
}
