use crate::ai::normalize;
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

/// Thin client for the hosted generative-language API. One call per request,
/// no retries here; a failure bubbles up and the handler substitutes its
/// fallback payload.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Returns `None` when no credential is configured, which puts the AI
    /// endpoints in mock mode.
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .gemini_api_key
            .as_ref()
            .map(|key| Self::new(key.clone(), config.gemini_base_url.clone()))
    }

    /// Send a prompt and return the raw response envelope.
    pub async fn generate(&self, prompt: &str) -> Result<Value> {
        let url = format!(
            "{}/models/gemini-pro:generateContent?key={}",
            self.base_url, self.api_key
        );

        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 1000,
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("gemini request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "gemini api error: {} {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let value: Value = response
            .json()
            .await
            .context("invalid json from gemini api")?;

        if value.pointer("/candidates/0/content").is_none() {
            return Err(anyhow!("gemini response has no candidates"));
        }

        Ok(value)
    }

    /// Send a prompt and return the extracted response text.
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let value = self.generate(prompt).await?;
        Ok(normalize::extract_text(&value))
    }
}
