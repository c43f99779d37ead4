use crate::config::ScraperConfig;
use anyhow::{Context, Result, bail};
use std::time::Duration;
use tracing::debug;

/// Thin GET-as-text wrapper. Every request is bounded by the configured
/// timeout; there is no retry.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// The underlying client, shared with the notifiers.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {} from {}", status, url);
        }

        resp.text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))
    }
}
