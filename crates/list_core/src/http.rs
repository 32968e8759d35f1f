use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    error::{ApiError, ApiException},
    protocol::{BulkOutcome, BulkRequest, PageOfRows, QueryParams},
};
use tracing::debug;

use crate::{BulkActionClient, PageFetcher};

/// REST collaborator for one admin collection, e.g. `https://host/api` +
/// `bookings`.
#[derive(Clone)]
pub struct HttpListApi {
    http: Client,
    base_url: String,
    resource: String,
}

impl HttpListApi {
    pub fn new(base_url: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, resource)
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            resource: resource.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resource.trim_matches('/')
        )
    }
}

async fn error_from_response(res: Response) -> anyhow::Error {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api) => anyhow::Error::new(ApiException::from(api)).context(format!("HTTP {status}")),
        Err(_) if body.trim().is_empty() => anyhow!("HTTP {status}"),
        Err(_) => anyhow!("HTTP {status}: {}", body.trim()),
    }
}

#[async_trait]
impl PageFetcher for HttpListApi {
    async fn fetch_page(&self, params: &QueryParams) -> Result<PageOfRows> {
        let url = format!("{}?{}", self.collection_url(), params.to_query_string());
        debug!(url = %url, "fetching list page");

        let res = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {} page {}", self.resource, params.page))?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        res.json::<PageOfRows>()
            .await
            .with_context(|| format!("malformed {} page response", self.resource))
    }
}

#[async_trait]
impl BulkActionClient for HttpListApi {
    async fn bulk_apply(&self, request: &BulkRequest) -> Result<BulkOutcome> {
        let url = format!("{}/bulk", self.collection_url());
        let res = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| {
                format!(
                    "failed to send bulk {} for {}",
                    request.action.name(),
                    self.resource
                )
            })?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        res.json::<BulkOutcome>()
            .await
            .with_context(|| format!("malformed bulk response for {}", self.resource))
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
