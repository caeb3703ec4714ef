//! Immutable run configuration.
//!
//! A [`PublishConfig`] is built once at start-up (see the CLI's `load_config`)
//! and handed by reference to every step of a run. Nothing reads the
//! environment after that point.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Default sender address for administrator reports.
pub const DEFAULT_EMAIL_FROM: &str = "no-reply@dadosjusbr.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// The month being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    month: u32,
    year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self, ConfigError> {
        if !(1..=12).contains(&month) {
            return Err(ConfigError::Invalid {
                name: "MONTH",
                reason: format!("{month} is not a month between 1 and 12"),
            });
        }
        if year <= 0 {
            return Err(ConfigError::Invalid {
                name: "YEAR",
                reason: format!("{year} is not a positive year"),
            });
        }
        Ok(Self { month, year })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Where the spreadsheet listing comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// An index page already published at a URL.
    Remote { url: String },
    /// A local directory; an index page is generated for it on each run.
    Local { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub api_key: Secret,
    pub endpoint: Option<String>,
    pub from: String,
    pub admins_mail: String,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub period: Period,
    pub source: SourceConfig,
    /// Directory that receives the transient index document.
    pub index_dir: PathBuf,
    pub parser_url: String,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub notification: NotificationConfig,
}

impl PublishConfig {
    pub fn trace_loaded(&self) {
        let source = match &self.source {
            SourceConfig::Remote { url } => format!("remote {url}"),
            SourceConfig::Local { path } => format!("local {}", path.display()),
        };
        info!(
            period = %self.period,
            source = %source,
            parser_url = %self.parser_url,
            storage_endpoint = %self.storage.endpoint,
            database = %self.database.name,
            admins_mail = %self.notification.admins_mail,
            "Loaded PublishConfig"
        );
        debug!(?self, "PublishConfig loaded (full debug)");
    }
}
