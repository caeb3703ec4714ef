//! SendGrid-backed [`Notifier`]: one v3 `mail/send` request per report.

use async_trait::async_trait;
use remuneration_sync_core::config::{NotificationConfig, Period};
use remuneration_sync_core::contract::{CollaboratorInitError, MailEnvelope, Notifier, NotifyError};
use serde_json::json;

pub const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendgridClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SendgridClient {
    pub fn new(config: &NotificationConfig) -> Result<Self, CollaboratorInitError> {
        if config.api_key.is_empty() {
            return Err(CollaboratorInitError::Invalid {
                collaborator: "notification",
                reason: "SENDGRID_API_KEY is empty".into(),
            });
        }
        let endpoint = config.endpoint.clone().unwrap_or_else(|| SENDGRID_URL.to_string());
        reqwest::Url::parse(&endpoint).map_err(|e| CollaboratorInitError::Invalid {
            collaborator: "notification",
            reason: format!("invalid endpoint {endpoint}: {e}"),
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| CollaboratorInitError::Client {
                collaborator: "notification",
                source,
            })?;
        tracing::info!(endpoint = %endpoint, "Initialised SendGrid client");
        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.expose().to_string(),
        })
    }

    async fn send(&self, envelope: &MailEnvelope, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": envelope.to }] }],
            "from": { "email": envelope.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });
        tracing::debug!(to = %envelope.to, subject, "Sending notification");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "SendGrid rejected notification");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

pub fn success_message(period: Period) -> (String, String) {
    (
        format!("remuneration-sync: {period} published"),
        format!("The spreadsheets for {period} were processed and published successfully."),
    )
}

pub fn failure_message(period: Period, error: &str) -> (String, String) {
    (
        format!("remuneration-sync error: {period}"),
        format!("Publishing the spreadsheets for {period} failed.\n\nError:\n{error}"),
    )
}

#[async_trait]
impl Notifier for SendgridClient {
    async fn send_failure(
        &self,
        envelope: &MailEnvelope,
        period: Period,
        error: &str,
    ) -> Result<(), NotifyError> {
        let (subject, body) = failure_message(period, error);
        self.send(envelope, &subject, &body).await
    }

    async fn send_success(&self, envelope: &MailEnvelope, period: Period) -> Result<(), NotifyError> {
        let (subject, body) = success_message(period);
        self.send(envelope, &subject, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_carries_period_and_error() {
        let period = Period::new(11, 2023).unwrap();
        let (subject, body) = failure_message(period, "parser unavailable");
        assert!(subject.contains("11/2023"));
        assert!(body.contains("11/2023"));
        assert!(body.ends_with("parser unavailable"));
    }

    #[test]
    fn success_message_names_the_period() {
        let (subject, _) = success_message(Period::new(1, 2024).unwrap());
        assert_eq!(subject, "remuneration-sync: 01/2024 published");
    }
}
