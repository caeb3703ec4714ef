//! Object storage over plain HTTP: `PUT <endpoint>/<key>` with basic auth.

use async_trait::async_trait;
use remuneration_sync_core::config::StorageConfig;
use remuneration_sync_core::contract::{
    CollaboratorError, CollaboratorInitError, Storage, StoredObject,
};

pub struct HttpStorage {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    username: String,
    password: String,
}

impl HttpStorage {
    pub fn new(config: &StorageConfig) -> Result<Self, CollaboratorInitError> {
        if config.username.is_empty() || config.password.is_empty() {
            return Err(CollaboratorInitError::Invalid {
                collaborator: "storage",
                reason: "PCLOUD_USERNAME and PCLOUD_PASSWORD must both be set".into(),
            });
        }
        let endpoint = reqwest::Url::parse(&config.endpoint).map_err(|e| CollaboratorInitError::Invalid {
            collaborator: "storage",
            reason: format!("invalid endpoint {}: {e}", config.endpoint),
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(CollaboratorInitError::Invalid {
                collaborator: "storage",
                reason: format!("endpoint {endpoint} cannot hold object paths"),
            });
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| CollaboratorInitError::Client {
                collaborator: "storage",
                source,
            })?;
        tracing::info!(endpoint = %endpoint, username = %config.username, "Initialised storage client");
        Ok(Self {
            http,
            endpoint,
            username: config.username.clone(),
            password: config.password.expose().to_string(),
        })
    }
}

#[async_trait]
impl Storage for HttpStorage {
    async fn upload(&self, key: &str, content: Vec<u8>) -> Result<StoredObject, CollaboratorError> {
        // Segments are percent-encoded, so names with `#` or `?` stay in the path.
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| "storage endpoint cannot hold object paths")?
            .pop_if_empty()
            .extend(key.split('/'));
        tracing::info!(key, size = content.len(), "Uploading object");

        self.http
            .put(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| {
                tracing::error!(error = ?e, key, "Object upload rejected");
                e
            })?;

        Ok(StoredObject {
            key: key.to_string(),
            url: url.to_string(),
        })
    }
}
