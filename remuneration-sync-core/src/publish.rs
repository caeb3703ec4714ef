//! High-level run: resolve the index → process the month → notify the administrators.
//!
//! This module sequences one publication run for an already loaded
//! [`PublishConfig`] and already constructed collaborators:
//!   - Resolves the index source: the configured remote URL, or an index
//!     page generated for the configured local directory
//!   - Hands the index locator, the period and the clients to a [`Processor`]
//!   - Reports the outcome through a [`Notifier`]
//!
//! # Error Handling
//! A processing failure is the one recoverable outcome: it is turned into a
//! failure notification and reported as [`PublishOutcome::FailureReported`].
//! Index generation and notification failures abort the run with a
//! [`PublishError`].
//!
//! # Cleanup
//! A generated index page is deleted as soon as the processor returns, and
//! the database client is closed exactly once before [`publish_month`]
//! returns, on every path.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Period, PublishConfig, SourceConfig};
use crate::contract::{
    Clients, MailEnvelope, Notifier, NotifyError, ProcessReport, ProcessRequest, Processor,
};
use crate::index::{generate_index, IndexDocument, IndexError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("index generation failed: {0}")]
    Index(#[from] IndexError),
    #[error("failed to send {kind} notification: {source}")]
    Notification {
        kind: &'static str,
        #[source]
        source: NotifyError,
    },
}

/// How a completed run ended.
#[derive(Debug)]
pub enum PublishOutcome {
    Published { report: ProcessReport },
    /// Processing failed and the administrators were told.
    FailureReported { period: Period, error: String },
}

/// The index a run processes.
#[derive(Debug)]
pub enum IndexSource {
    Remote(String),
    Generated(IndexDocument),
}

impl IndexSource {
    pub fn resolve(config: &PublishConfig) -> Result<Self, IndexError> {
        match &config.source {
            SourceConfig::Remote { url } => {
                info!(url = %url, "[PUBLISH] Using remote index");
                Ok(Self::Remote(url.clone()))
            }
            SourceConfig::Local { path } => {
                let document = generate_index(path, &config.index_dir)?;
                Ok(Self::Generated(document))
            }
        }
    }

    pub fn locator(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Generated(document) => document.locator(),
        }
    }

    /// Deletes a generated index page. Remote sources need no cleanup.
    pub fn release(self) {
        if let Self::Generated(document) = self {
            let path = document.path().to_path_buf();
            if let Err(e) = document.remove() {
                warn!(error = ?e, path = %path.display(), "[PUBLISH] Failed to remove index document");
            }
        }
    }
}

/// Runs one publication and closes the database client afterwards.
pub async fn publish_month<P, N>(
    config: &PublishConfig,
    processor: &P,
    clients: &Clients,
    notifier: &N,
) -> Result<PublishOutcome, PublishError>
where
    P: Processor + ?Sized,
    N: Notifier + ?Sized,
{
    let result = run(config, processor, clients, notifier).await;

    if let Err(e) = clients.database.close().await {
        warn!(error = ?e, "[PUBLISH] Failed to close database connection");
    }
    result
}

async fn run<P, N>(
    config: &PublishConfig,
    processor: &P,
    clients: &Clients,
    notifier: &N,
) -> Result<PublishOutcome, PublishError>
where
    P: Processor + ?Sized,
    N: Notifier + ?Sized,
{
    let period = config.period;
    info!(%period, "[PUBLISH] Starting publication run");

    let index = IndexSource::resolve(config).map_err(|e| {
        error!(error = ?e, "[PUBLISH][ERROR] Could not resolve index");
        e
    })?;
    let request = ProcessRequest {
        index_url: index.locator(),
        period,
    };
    info!(index_url = %request.index_url, "[PUBLISH] Processing spreadsheets");

    let processed = processor.process(&request, clients).await;
    index.release();

    let envelope = MailEnvelope {
        from: config.notification.from.clone(),
        to: config.notification.admins_mail.clone(),
    };

    match processed {
        Ok(report) => {
            info!(
                %period,
                spreadsheets = report.spreadsheets.len(),
                records = report.records,
                "[PUBLISH] Month published"
            );
            notifier
                .send_success(&envelope, period)
                .await
                .map_err(|source| {
                    error!(error = ?source, to = %envelope.to, "[PUBLISH][ERROR] Success notification failed");
                    PublishError::Notification {
                        kind: "success",
                        source,
                    }
                })?;
            info!(to = %envelope.to, "[PUBLISH] Success notification sent");
            Ok(PublishOutcome::Published { report })
        }
        Err(e) => {
            error!(%period, error = ?e, "[PUBLISH][ERROR] Processing failed");
            let detail = e.to_string();
            notifier
                .send_failure(&envelope, period, &detail)
                .await
                .map_err(|source| {
                    error!(error = ?source, to = %envelope.to, "[PUBLISH][ERROR] Failure notification failed");
                    PublishError::Notification {
                        kind: "failure",
                        source,
                    }
                })?;
            info!(to = %envelope.to, "[PUBLISH] Failure notification sent");
            Ok(PublishOutcome::FailureReported {
                period,
                error: detail,
            })
        }
    }
}
