//! HTTP client for the external website analyzer service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use markly_core::defaults::{ANALYZER_TIMEOUT_SECS, ANALYZER_URL};
use markly_core::{Error, Result, WebsiteAnalysis, WebsiteAnalyzer};

/// Longest response body echoed into an error message.
const ERROR_BODY_MAX_CHARS: usize = 200;

/// Configuration for the HTTP website analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Base URL of the analyzer service.
    pub base_url: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: ANALYZER_URL.to_string(),
            api_key: None,
            timeout_seconds: ANALYZER_TIMEOUT_SECS,
        }
    }
}

impl AnalyzerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ANALYZER_BASE_URL` | `http://localhost:8787` |
    /// | `ANALYZER_API_KEY` | unset |
    /// | `ANALYZER_TIMEOUT_SECS` | `60` |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ANALYZER_BASE_URL")
                .unwrap_or_else(|_| ANALYZER_URL.to_string()),
            api_key: std::env::var("ANALYZER_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            timeout_seconds: std::env::var("ANALYZER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(ANALYZER_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    url: &'a str,
    tags: &'a [String],
    user_id: &'a str,
}

/// [`WebsiteAnalyzer`] backed by `POST {base_url}/analyze`.
pub struct HttpWebsiteAnalyzer {
    client: Client,
    config: AnalyzerConfig,
}

impl HttpWebsiteAnalyzer {
    /// Create a new analyzer client with the given configuration.
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "analyzer",
            base_url = %config.base_url,
            timeout_secs = config.timeout_seconds,
            authenticated = config.api_key.is_some(),
            "Initializing website analyzer client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(AnalyzerConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/analyze", self.config.base_url.trim_end_matches('/'))
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= ERROR_BODY_MAX_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(ERROR_BODY_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

#[async_trait]
impl WebsiteAnalyzer for HttpWebsiteAnalyzer {
    async fn analyze(
        &self,
        url: &str,
        known_tags: &[String],
        user_id: &str,
    ) -> Result<WebsiteAnalysis> {
        let start = Instant::now();
        let mut request = self.client.post(self.endpoint()).json(&AnalyzeRequest {
            url,
            tags: known_tags,
            user_id,
        });
        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                subsystem = "inference",
                component = "analyzer",
                url,
                status = status.as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Analyzer returned an error status"
            );
            return Err(Error::Inference(format!(
                "analyzer returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let analysis: WebsiteAnalysis = serde_json::from_str(&body)?;
        debug!(
            subsystem = "inference",
            component = "analyzer",
            url,
            suggested_tags = analysis.tags.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Website analyzed"
        );
        Ok(analysis)
    }
}
