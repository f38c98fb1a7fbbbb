use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::models::{Project, ProjectId, ProjectResponse, SyncBatch};
use crate::settings::Settings;
use crate::sync::UploadClient;

/// JSON client for the research backend.
#[derive(Clone)]
pub struct HttpUploadClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpUploadClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("healthsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Self::new(settings.server_url.clone(), settings.request_timeout())?;
        Ok(client.with_auth_token(settings.auth_token.clone()))
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_data_url(&self, project_id: ProjectId) -> String {
        format!(
            "{}/api/v1/projects/{}/health-data",
            self.base_url, project_id
        )
    }

    pub async fn fetch_projects(&self) -> Result<Vec<Project>> {
        let url = format!("{}/api/v1/projects", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("project list failed ({status}): {body}");
        }

        let parsed: ProjectResponse = response
            .json()
            .await
            .context("failed to decode project list")?;
        Ok(parsed.into_projects())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn send(&self, batch: &SyncBatch) -> Result<()> {
        let url = self.health_data_url(batch.project_id());
        let response = self
            .authorize(self.client.post(&url))
            .json(batch)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("health data upload failed ({status}): {body}");
        }

        log::debug!(
            "uploaded {} snapshots to project {}",
            batch.len(),
            batch.project_id()
        );
        Ok(())
    }
}
