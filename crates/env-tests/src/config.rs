//! Test environment configuration.
//!
//! Everything is read from environment variables with defaults matching the
//! compose descriptors under `resources/cases`.

use env_harness::auth::{AuthScheme, Credentials, UnknownAuthScheme};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WRENIDM_BASE_URL: &str = "http://wrenidm.wrensecurity.local:8080";
pub const DEFAULT_SMTP_API_BASE_URL: &str = "http://smtp.wrensecurity.local:8025";
pub const DEFAULT_ADMIN_USERNAME: &str = "openidm-admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "openidm-admin";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_COMPOSE_BINARY: &str = "docker";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error(transparent)]
    AuthScheme(#[from] UnknownAuthScheme),
}

/// How the controller decides the IDM container is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessMode {
    /// Poll `/openidm/info/ping` for `ACTIVE_READY`.
    #[default]
    Http,
    /// Wait for the startup banner in the container log.
    Log,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub wrenidm_base_url: String,
    pub smtp_api_base_url: String,
    pub admin: Credentials,
    pub auth_scheme: AuthScheme,
    pub cases_dir: PathBuf,
    pub startup_timeout: Duration,
    pub readiness: ReadinessMode,
    pub compose_binary: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str, default: &str| -> String {
            vars.get(name)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let admin = Credentials::new(
            get("ADMIN_USERNAME", DEFAULT_ADMIN_USERNAME),
            get("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD),
        );

        let auth_scheme: AuthScheme = get("WRENIDM_AUTH_SCHEME", "basic").parse()?;

        let cases_dir = vars
            .get("WRENIDM_CASES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources/cases"));

        let startup_timeout_secs = match vars.get("WRENIDM_STARTUP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: "WRENIDM_STARTUP_TIMEOUT_SECS".to_string(),
                    message: e.to_string(),
                })?,
            None => DEFAULT_STARTUP_TIMEOUT_SECS,
        };

        let readiness = match get("WRENIDM_READINESS", "http").to_ascii_lowercase().as_str() {
            "http" => ReadinessMode::Http,
            "log" => ReadinessMode::Log,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "WRENIDM_READINESS".to_string(),
                    message: format!("expected 'http' or 'log', got '{}'", other),
                })
            }
        };

        Ok(Config {
            wrenidm_base_url: get("WRENIDM_BASE_URL", DEFAULT_WRENIDM_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            smtp_api_base_url: get("SMTP_API_BASE_URL", DEFAULT_SMTP_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            admin,
            auth_scheme,
            cases_dir,
            startup_timeout: Duration::from_secs(startup_timeout_secs),
            readiness,
            compose_binary: get("COMPOSE_BINARY", DEFAULT_COMPOSE_BINARY),
        })
    }

    /// Compose descriptor of a test case.
    pub fn compose_file(&self, case: &str) -> PathBuf {
        self.cases_dir.join(case).join("compose.yaml")
    }
}
