use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::LifecyclePolicy;
use crate::reports::ReportingPolicy;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["surplus.toml", "config/surplus.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub lifecycle: LifecycleConfig,
    pub reporting: ReportingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub allow_requests_on_claimed: bool,
    pub auto_reject_siblings: bool,
}

#[derive(Clone, Debug)]
pub struct ReportingConfig {
    pub max_window_days: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub allow_requests_on_claimed: Option<bool>,
    pub auto_reject_siblings: Option<bool>,
    pub max_window_days: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let lifecycle = LifecyclePolicy::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://surplus.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            lifecycle: LifecycleConfig {
                allow_requests_on_claimed: lifecycle.allow_requests_on_claimed,
                auto_reject_siblings: lifecycle.auto_reject_siblings,
            },
            reporting: ReportingConfig {
                max_window_days: ReportingPolicy::default().max_window_days,
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            allow_requests_on_claimed: self.lifecycle.allow_requests_on_claimed,
            auto_reject_siblings: self.lifecycle.auto_reject_siblings,
        }
    }

    pub fn reporting_policy(&self) -> ReportingPolicy {
        ReportingPolicy { max_window_days: self.reporting.max_window_days }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(lifecycle) = patch.lifecycle {
            if let Some(allow) = lifecycle.allow_requests_on_claimed {
                self.lifecycle.allow_requests_on_claimed = allow;
            }
            if let Some(auto_reject) = lifecycle.auto_reject_siblings {
                self.lifecycle.auto_reject_siblings = auto_reject;
            }
        }

        if let Some(reporting) = patch.reporting {
            if let Some(max_window_days) = reporting.max_window_days {
                self.reporting.max_window_days = max_window_days;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SURPLUS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SURPLUS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SURPLUS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SURPLUS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SURPLUS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("SURPLUS_LOGGING_LEVEL").or_else(|| read_env("SURPLUS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SURPLUS_LOGGING_FORMAT").or_else(|| read_env("SURPLUS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("SURPLUS_LIFECYCLE_ALLOW_REQUESTS_ON_CLAIMED") {
            self.lifecycle.allow_requests_on_claimed =
                parse_bool("SURPLUS_LIFECYCLE_ALLOW_REQUESTS_ON_CLAIMED", &value)?;
        }
        if let Some(value) = read_env("SURPLUS_LIFECYCLE_AUTO_REJECT_SIBLINGS") {
            self.lifecycle.auto_reject_siblings =
                parse_bool("SURPLUS_LIFECYCLE_AUTO_REJECT_SIBLINGS", &value)?;
        }

        if let Some(value) = read_env("SURPLUS_REPORTING_MAX_WINDOW_DAYS") {
            self.reporting.max_window_days =
                parse_u32("SURPLUS_REPORTING_MAX_WINDOW_DAYS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(allow) = overrides.allow_requests_on_claimed {
            self.lifecycle.allow_requests_on_claimed = allow;
        }
        if let Some(auto_reject) = overrides.auto_reject_siblings {
            self.lifecycle.auto_reject_siblings = auto_reject;
        }
        if let Some(max_window_days) = overrides.max_window_days {
            self.reporting.max_window_days = max_window_days;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_reporting(&self.reporting)?;
        Ok(())
    }
}

/// Returns the config file `load` would read: the explicit path when it exists,
/// otherwise the first default location present on disk.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_reporting(reporting: &ReportingConfig) -> Result<(), ConfigError> {
    if reporting.max_window_days == 0 || reporting.max_window_days > 3660 {
        return Err(ConfigError::Validation(
            "reporting.max_window_days must be in range 1..=3660".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    lifecycle: Option<LifecyclePatch>,
    reporting: Option<ReportingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct LifecyclePatch {
    allow_requests_on_claimed: Option<bool>,
    auto_reject_siblings: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportingPatch {
    max_window_days: Option<u32>,
}
