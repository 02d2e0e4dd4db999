//! Typed HTTP client for the service endpoints, for UIs and tools talking
//! to a running server. Transient failures (transport errors and 5xx) are
//! retried a fixed number of times with exponential backoff; client errors
//! are returned as-is.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::api::ai::{
    NegotiationRequest, NegotiationResponse, PriceSuggestionRequest, PriceSuggestionResponse,
    TranslationRequest, TranslationResponse,
};
use crate::api::{ApiResponse, HealthResponse};
use crate::config::Config;

#[derive(Clone, Debug)]
pub struct MandiClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl MandiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn from_config(base_url: impl Into<String>, config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay,
        }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>> {
        let url = format!("{}{}", self.base_url, path);
        let mut delay = self.retry_delay;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.http.post(&url).json(body).send().await {
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(anyhow!("server error: {}", response.status()));
                }
                Ok(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("invalid response body from {path}"));
                }
                Err(e) => {
                    last_error = Some(anyhow::Error::from(e));
                }
            }

            if attempt < self.max_retries {
                warn!("request to {path} failed (attempt {attempt}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("request to {path} failed")))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/api/health", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .context("health request failed")?
            .json()
            .await
            .context("invalid health response body")
    }

    pub async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<ApiResponse<TranslationResponse>> {
        self.post_json("/api/ai/translate", request).await
    }

    pub async fn price_suggestion(
        &self,
        request: &PriceSuggestionRequest,
    ) -> Result<ApiResponse<PriceSuggestionResponse>> {
        self.post_json("/api/ai/price-suggestion", request).await
    }

    pub async fn negotiation(
        &self,
        request: &NegotiationRequest,
    ) -> Result<ApiResponse<NegotiationResponse>> {
        self.post_json("/api/ai/negotiation", request).await
    }
}
