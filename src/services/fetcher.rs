// src/services/fetcher.rs

//! Listing fetcher.
//!
//! Performs one bounded HTTP call per instance. Every failure is turned into
//! a [`FetchError`] and reported to the health cache; nothing is thrown past
//! this module.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FetchError, Result};
use crate::models::{HttpConfig, ListingPage, ListingQuery};
use crate::services::InstanceHealthCache;
use crate::utils::http::create_async_client;
use crate::utils::url::endpoint;

const PROBE_PATH: &str = "/api/v1/config";

/// Anything that can list records from an instance.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one page of records from `host`.
    async fn fetch(
        &self,
        host: &str,
        query: &ListingQuery,
    ) -> std::result::Result<ListingPage, FetchError>;

    /// Check that `host` answers; returns its reported server version.
    async fn probe(&self, _host: &str) -> std::result::Result<String, FetchError> {
        Ok(String::new())
    }

    /// Report an anonymous view of video `id` to `host`.
    async fn submit_view(&self, _host: &str, _id: &str) -> std::result::Result<(), FetchError> {
        Ok(())
    }
}

/// HTTP implementation of [`ListingSource`].
#[derive(Debug, Clone)]
pub struct ListingFetcher {
    client: Client,
    health: Arc<InstanceHealthCache>,
}

impl ListingFetcher {
    pub fn new(client: Client, health: Arc<InstanceHealthCache>) -> Self {
        Self { client, health }
    }

    /// Build a fetcher with a client configured from `config`.
    pub fn from_config(config: &HttpConfig, health: Arc<InstanceHealthCache>) -> Result<Self> {
        Ok(Self::new(create_async_client(config)?, health))
    }

    pub fn health(&self) -> &Arc<InstanceHealthCache> {
        &self.health
    }

    /// Record the failure in the health cache and hand it back.
    fn penalize(&self, error: FetchError) -> FetchError {
        self.health.mark_unhealthy(error.host(), &error.to_string());
        error
    }

    /// GET `path` on `host` and return a non-empty body.
    async fn get_body(
        &self,
        host: &str,
        path: &str,
        params: &[(&'static str, String)],
    ) -> std::result::Result<String, FetchError> {
        let url = endpoint(host, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| FetchError::unreachable(host, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::bad_response(host, status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::unreachable(host, describe(&e)))?;
        if body.trim().is_empty() {
            return Err(FetchError::malformed(host, "empty body"));
        }
        Ok(body)
    }
}

#[async_trait]
impl ListingSource for ListingFetcher {
    async fn fetch(
        &self,
        host: &str,
        query: &ListingQuery,
    ) -> std::result::Result<ListingPage, FetchError> {
        let result = match self.get_body(host, query.path(), &query.params()).await {
            Ok(body) => {
                ListingPage::parse(&body, query).map_err(|e| FetchError::malformed(host, e))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(page) => {
                log::debug!(
                    "{}: {} record(s) of {} (more: {})",
                    host,
                    page.records.len(),
                    page.total,
                    page.has_more
                );
                Ok(page)
            }
            Err(e) => Err(self.penalize(e)),
        }
    }

    async fn probe(&self, host: &str) -> std::result::Result<String, FetchError> {
        let result = match self.get_body(host, PROBE_PATH, &[]).await {
            Ok(body) => serde_json::from_str::<Value>(&body)
                .map_err(|e| FetchError::malformed(host, e))
                .map(|config| {
                    config
                        .get("serverVersion")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(version) => {
                self.health.mark_healthy(host);
                Ok(version)
            }
            Err(e) => Err(self.penalize(e)),
        }
    }

    async fn submit_view(&self, host: &str, id: &str) -> std::result::Result<(), FetchError> {
        let url = endpoint(host, &format!("/api/v1/videos/{id}/views"));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| FetchError::unreachable(host, describe(&e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::bad_response(host, status.as_u16()))
        }
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}
