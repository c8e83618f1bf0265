//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const DEV_DATA_DIR: &str = "./data";
    pub const DEV_LICENSE_POLL_SECS: u64 = 30;
    pub const DEV_SCHEDULER_POLL_MILLIS: u64 = 1000;
    pub const DEV_TERMINATION_GRACE_SECS: u64 = 5;
    pub const DEV_LICENSE_PROBE_TIMEOUT_SECS: u64 = 5;
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Root directory for project uploads and job workspaces
    pub data_dir: PathBuf,
    /// Directory for static frontend assets (production only)
    pub static_dir: Option<PathBuf>,
    /// Directory containing the Questa tool binaries; empty means `$PATH`
    pub questa_bin_dir: Option<PathBuf>,
    /// License server address, `port@host` or `host:port`. When unset the
    /// gatekeeper reports available (development only).
    pub license_server: Option<String>,
    /// Interval between background license checks
    pub license_poll_interval: Duration,
    /// Connect timeout for a single license probe
    pub license_probe_timeout: Duration,
    /// Interval between dispatcher scheduling passes
    pub scheduler_poll_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL when tearing a stage down
    pub termination_grace: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development) only RUST_ENV is required;
    /// everything else has a sensible default. In production mode the license
    /// server must be configured and the data directory must not be the
    /// development default.
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `QVS_HOST`: Server host (default: 127.0.0.1)
    /// - `QVS_PORT`: Server port (default: 8080)
    /// - `QVS_DATA_DIR`: Projects/workspaces root (default: ./data)
    /// - `QVS_STATIC_DIR`: Static assets directory for production
    /// - `QUESTA_BIN_DIR`: Directory with vlog/vopt/vsim/qverify binaries
    /// - `QVS_LICENSE_SERVER`: License server, `port@host` or `host:port`
    /// - `QVS_LICENSE_POLL_SECS`: License poll interval (default: 30)
    /// - `QVS_LICENSE_PROBE_TIMEOUT_SECS`: Probe connect timeout (default: 5)
    /// - `QVS_SCHEDULER_POLL_MILLIS`: Scheduler tick interval (default: 1000)
    /// - `QVS_TERMINATION_GRACE_SECS`: SIGTERM→SIGKILL grace (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Parse environment - required
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let host = env::var("QVS_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("QVS_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("QVS_PORT must be a valid port number"))?;

        let data_dir = PathBuf::from(
            env::var("QVS_DATA_DIR").unwrap_or_else(|_| defaults::DEV_DATA_DIR.to_string()),
        );

        let static_dir = env::var("QVS_STATIC_DIR").ok().map(PathBuf::from);
        let questa_bin_dir = env::var("QUESTA_BIN_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let license_server = env::var("QVS_LICENSE_SERVER").ok().filter(|s| !s.is_empty());

        let license_poll_interval = Duration::from_secs(parse_env_u64(
            "QVS_LICENSE_POLL_SECS",
            defaults::DEV_LICENSE_POLL_SECS,
        )?);
        let license_probe_timeout = Duration::from_secs(parse_env_u64(
            "QVS_LICENSE_PROBE_TIMEOUT_SECS",
            defaults::DEV_LICENSE_PROBE_TIMEOUT_SECS,
        )?);
        let scheduler_poll_interval = Duration::from_millis(parse_env_u64(
            "QVS_SCHEDULER_POLL_MILLIS",
            defaults::DEV_SCHEDULER_POLL_MILLIS,
        )?);
        let termination_grace = Duration::from_secs(parse_env_u64(
            "QVS_TERMINATION_GRACE_SECS",
            defaults::DEV_TERMINATION_GRACE_SECS,
        )?);

        let config = Config {
            environment,
            host,
            port,
            data_dir,
            static_dir,
            questa_bin_dir,
            license_server,
            license_poll_interval,
            license_probe_timeout,
            scheduler_poll_interval,
            termination_grace,
        };

        // Validate production configuration
        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.license_server.is_none() {
            errors.push(
                "QVS_LICENSE_SERVER is not set. Production requires a license server address."
                    .to_string(),
            );
        }

        if self.data_dir == PathBuf::from(defaults::DEV_DATA_DIR) {
            errors.push(format!(
                "QVS_DATA_DIR is using development default '{}'. Set a production data directory.",
                defaults::DEV_DATA_DIR
            ));
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }

    /// Root directory for uploaded project sources.
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    /// Root directory for per-job workspaces.
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }
}

fn parse_env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("{0} must be a valid number")]
    InvalidNumber(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
