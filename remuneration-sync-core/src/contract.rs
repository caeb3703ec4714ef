//! # contract: collaborator interfaces of a publication run
//!
//! A run talks to four external services and one processing pipeline. Each
//! is reduced here to the narrow capability the run needs:
//!
//! - [`Storage`]: can upload a spreadsheet and tell where it lives.
//! - [`ParserService`]: can turn a spreadsheet into structured records.
//! - [`Database`]: can persist a month of records, and must be closed.
//! - [`Notifier`]: can report success or failure to the administrators.
//! - [`Processor`]: consumes an index locator and drives the first three.
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall` (behind `test-export-mocks`, on by
//! default) so tests in this and dependent crates can swap in `Mock*`
//! implementations without touching orchestration code.
//!
//! ## Errors
//! Service calls return [`CollaboratorError`], a boxed error, since each
//! concrete client has its own failure vocabulary. The processor and the
//! notifier have typed errors because the orchestrator branches on them.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::Period;

/// Error type returned by storage, parser and database clients.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Raised when a collaborator client cannot be constructed.
#[derive(Debug, Error)]
pub enum CollaboratorInitError {
    #[error("{collaborator} client misconfigured: {reason}")]
    Invalid {
        collaborator: &'static str,
        reason: String,
    },
    #[error("failed to build {collaborator} client: {source}")]
    Client {
        collaborator: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload `content` under `key`, replacing whatever was there.
    async fn upload(&self, key: &str, content: Vec<u8>) -> Result<StoredObject, CollaboratorError>;
}

/// One spreadsheet handed to the parsing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    pub file_name: String,
    pub period: Period,
    pub content: Vec<u8>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ParserService: Send + Sync {
    /// Parse a spreadsheet into records. The record shape belongs to the service.
    async fn parse(&self, request: ParseRequest) -> Result<Vec<serde_json::Value>, CollaboratorError>;
}

/// A spreadsheet that went through storage and parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSpreadsheet {
    pub name: String,
    /// Locator the spreadsheet was discovered at.
    pub source: String,
    pub sha256: String,
    pub size: usize,
    pub storage: StoredObject,
}

/// Everything persisted for one published month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRecord {
    pub period: Period,
    pub spreadsheets: Vec<StoredSpreadsheet>,
    pub records: Vec<serde_json::Value>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Database: Send + Sync {
    async fn store_month(&self, record: &MonthRecord) -> Result<(), CollaboratorError>;

    /// Release the connection. Later calls to `store_month` fail.
    async fn close(&self) -> Result<(), CollaboratorError>;
}

/// Sender and recipient of an administrator report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification service answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_failure(
        &self,
        envelope: &MailEnvelope,
        period: Period,
        error: &str,
    ) -> Result<(), NotifyError>;

    async fn send_success(&self, envelope: &MailEnvelope, period: Period) -> Result<(), NotifyError>;
}

/// The clients a processor drives.
#[derive(Clone)]
pub struct Clients {
    pub storage: Arc<dyn Storage>,
    pub parser: Arc<dyn ParserService>,
    pub database: Arc<dyn Database>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Locator of the index page listing the spreadsheets.
    pub index_url: String,
    pub period: Period,
}

/// Outcome of a successful processing run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub period: Period,
    pub spreadsheets: Vec<StoredSpreadsheet>,
    pub records: usize,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to fetch {locator}: {reason}")]
    Fetch { locator: String, reason: String },
    #[error("index {0} lists no spreadsheets")]
    EmptyIndex(String),
    #[error("failed to upload {name}: {source}")]
    Upload {
        name: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("failed to parse {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("failed to store {period}: {source}")]
    Store {
        period: Period,
        #[source]
        source: CollaboratorError,
    },
    #[error("{0}")]
    Other(String),
}

/// The processing pipeline: ingest an index, produce persisted records.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        request: &ProcessRequest,
        clients: &Clients,
    ) -> Result<ProcessReport, ProcessError>;
}
