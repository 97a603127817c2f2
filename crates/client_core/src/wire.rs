//! Remote listing/detail calls.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::EntityId,
    error::PipelineError,
    protocol::{DetailResponse, ListingResponse},
};
use tracing::debug;
use url::Url;

pub const DEFAULT_RESOURCE: &str = "pokemon";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait WireClient: Send + Sync {
    async fn list_entities(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<ListingResponse, PipelineError>;
    async fn fetch_entity_detail(&self, id: EntityId) -> Result<DetailResponse, PipelineError>;
}

pub struct HttpWireClient {
    http: Client,
    base_url: Url,
    resource: String,
}

impl HttpWireClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        // `Url::join` drops the last path segment unless it ends in '/'.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).with_context(|| format!("invalid api base url '{base_url}'"))?;
        Ok(Self {
            http,
            base_url,
            resource: DEFAULT_RESOURCE.to_string(),
        })
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into().trim_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, PipelineError> {
        self.base_url
            .join(path)
            .map_err(|e| PipelineError::transport_with(format!("invalid endpoint '{path}'"), e))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, u32)],
    ) -> Result<T, PipelineError> {
        debug!(%url, "wire: GET");
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?
            .error_for_status()
            .map_err(|e| request_error(&url, e))?;

        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::transport_with(format!("malformed payload from {url}"), e))
    }
}

fn request_error(url: &Url, err: reqwest::Error) -> PipelineError {
    let message = if err.is_timeout() {
        format!("request to {url} timed out")
    } else if let Some(status) = err.status() {
        format!("request to {url} failed with status {status}")
    } else {
        format!("request to {url} failed")
    };
    PipelineError::transport_with(message, err)
}

#[async_trait]
impl WireClient for HttpWireClient {
    async fn list_entities(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<ListingResponse, PipelineError> {
        let url = self.endpoint(&self.resource)?;
        self.get_json(url, &[("limit", limit), ("offset", offset)])
            .await
    }

    async fn fetch_entity_detail(&self, id: EntityId) -> Result<DetailResponse, PipelineError> {
        if id.0 <= 0 {
            return Err(PipelineError::transport(format!(
                "entity id must be positive, got {id}"
            )));
        }
        let url = self.endpoint(&format!("{}/{}", self.resource, id.0))?;
        self.get_json(url, &[]).await
    }
}

#[cfg(test)]
#[path = "tests/wire_tests.rs"]
mod tests;
