/// `load_config` module: builds the immutable [`PublishConfig`] of a run from
/// the environment, an optional YAML file and CLI flags.
///
/// # Sources and precedence
/// 1. CLI flags (period and index source only)
/// 2. Environment variables (a `.env` file is loaded by `main`)
/// 3. The optional YAML file, for non-secret settings only
///
/// Secrets (`PCLOUD_PASSWORD`, `MONGODB_URI`, `SENDGRID_API_KEY`, ...) are
/// read from the environment and nowhere else. Empty variables count as unset.
///
/// # Errors
/// Resolution fails with a [`ConfigError`] naming the offending setting;
/// [`load_config`] wraps it in `anyhow` context for the CLI.
use anyhow::{Context, Result};
use remuneration_sync_core::config::{
    ConfigError, DatabaseConfig, NotificationConfig, Period, PublishConfig, Secret, SourceConfig,
    StorageConfig, DEFAULT_EMAIL_FROM,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info};

/// Non-secret settings accepted in the YAML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub month_url: Option<String>,
    pub spreadsheets_path: Option<PathBuf>,
    pub parser_url: Option<String>,
    pub storage_url: Option<String>,
    pub database_name: Option<String>,
    pub email_from: Option<String>,
    pub admins_mail: Option<String>,
    pub index_dir: Option<PathBuf>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub month_url: Option<String>,
    pub spreadsheets_path: Option<PathBuf>,
}

/// Loads the run configuration from the process environment and, if given, a YAML file.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<PublishConfig> {
    let file = match path {
        Some(path) => read_settings(path)?,
        None => FileSettings::default(),
    };
    let config = resolve_config(file, overrides, |key| std::env::var(key).ok())
        .context("invalid configuration")?;
    info!(period = %config.period, "Config loaded and merged successfully");
    Ok(config)
}

pub fn read_settings(path: &Path) -> Result<FileSettings, ConfigError> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    // An empty file is a valid file with no settings.
    if content.trim().is_empty() {
        return Ok(FileSettings::default());
    }

    serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// Merges the three sources. `env` looks up one variable by name.
pub fn resolve_config<F>(
    file: FileSettings,
    overrides: &Overrides,
    env: F,
) -> Result<PublishConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

    let month = match overrides.month {
        Some(month) => month,
        None => match var("MONTH") {
            Some(raw) => parse_number("MONTH", &raw)?,
            None => file.month.ok_or(ConfigError::Missing("MONTH"))?,
        },
    };
    let year = match overrides.year {
        Some(year) => year,
        None => match var("YEAR") {
            Some(raw) => parse_number("YEAR", &raw)?,
            None => file.year.ok_or(ConfigError::Missing("YEAR"))?,
        },
    };
    let period = Period::new(month, year)?;

    let month_url = overrides
        .month_url
        .clone()
        .or_else(|| var("MONTH_URL"))
        .or(file.month_url)
        .filter(|url| !url.trim().is_empty());
    let spreadsheets_path = overrides
        .spreadsheets_path
        .clone()
        .or_else(|| var("LOCAL_SPREADSHEETS_PATH").map(PathBuf::from))
        .or(file.spreadsheets_path);
    let source = match (month_url, spreadsheets_path) {
        (Some(url), _) => SourceConfig::Remote { url },
        (None, Some(path)) => SourceConfig::Local { path },
        (None, None) => return Err(ConfigError::Missing("LOCAL_SPREADSHEETS_PATH")),
    };

    let index_dir = var("INDEX_DIR")
        .map(PathBuf::from)
        .or(file.index_dir)
        .unwrap_or_else(std::env::temp_dir);

    let parser_url = var("PARSER_URL")
        .or(file.parser_url)
        .ok_or(ConfigError::Missing("PARSER_URL"))?;

    let storage = StorageConfig {
        endpoint: var("STORAGE_URL")
            .or(file.storage_url)
            .ok_or(ConfigError::Missing("STORAGE_URL"))?,
        username: required("PCLOUD_USERNAME")?,
        password: Secret::new(required("PCLOUD_PASSWORD")?),
    };

    let database = DatabaseConfig {
        url: Secret::new(required("MONGODB_URI")?),
        name: var("MONGODB_NAME")
            .or(file.database_name)
            .ok_or(ConfigError::Missing("MONGODB_NAME"))?,
    };

    let notification = NotificationConfig {
        api_key: Secret::new(required("SENDGRID_API_KEY")?),
        endpoint: var("SENDGRID_URL"),
        from: var("EMAIL_FROM")
            .or(file.email_from)
            .unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
        admins_mail: var("SYSTEM_ADMINS_MAIL")
            .or(file.admins_mail)
            .ok_or(ConfigError::Missing("SYSTEM_ADMINS_MAIL"))?,
    };

    Ok(PublishConfig {
        period,
        source,
        index_dir,
        parser_url,
        storage,
        database,
        notification,
    })
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        error!(var = name, value = %raw, error = %e, "Setting must be an integer");
        ConfigError::Invalid {
            name,
            reason: format!("{raw:?} is not an integer: {e}"),
        }
    })
}
