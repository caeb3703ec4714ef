//! Client for the remote spreadsheet parsing service.
//!
//! Each spreadsheet is posted as a raw body; the period and file name travel
//! as query parameters. The service answers `{"records": [...]}`.

use async_trait::async_trait;
use remuneration_sync_core::contract::{
    CollaboratorError, CollaboratorInitError, ParseRequest, ParserService,
};
use serde::Deserialize;

pub struct ParserServiceClient {
    http: reqwest::Client,
    url: reqwest::Url,
}

#[derive(Deserialize)]
struct ParseResponse {
    #[serde(default)]
    records: Vec<serde_json::Value>,
}

impl ParserServiceClient {
    pub fn new(url: &str) -> Result<Self, CollaboratorInitError> {
        let url = reqwest::Url::parse(url).map_err(|e| CollaboratorInitError::Invalid {
            collaborator: "parser",
            reason: format!("invalid PARSER_URL {url}: {e}"),
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| CollaboratorInitError::Client {
                collaborator: "parser",
                source,
            })?;
        tracing::info!(url = %url, "Initialised parser service client");
        Ok(Self { http, url })
    }
}

#[async_trait]
impl ParserService for ParserServiceClient {
    async fn parse(&self, request: ParseRequest) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        tracing::info!(
            file = %request.file_name,
            size = request.content.len(),
            "Sending spreadsheet to parser service"
        );
        let response = self
            .http
            .post(self.url.clone())
            .query(&[
                ("month", request.period.month().to_string()),
                ("year", request.period.year().to_string()),
                ("file_name", request.file_name.clone()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(request.content)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, file = %request.file_name, "Parser service rejected spreadsheet");
            return Err(format!("parser service answered {status}: {body}").into());
        }

        let parsed: ParseResponse = response.json().await?;
        tracing::debug!(file = %request.file_name, records = parsed.records.len(), "Parser service answered");
        Ok(parsed.records)
    }
}
