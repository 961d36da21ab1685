use crate::constants::center::ACCESS_KEY_HEADER;
use crate::constants::network::TIMEOUT_API_REQUEST_MS;
use crate::errors::ToolError;
use crate::services::config::CenterConfig;
use crate::services::logger::Logger;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            body: None,
        }
    }
}

/// Authenticated JSON access to the fleet-management backend.
///
/// Returns the decoded body as-is; application failures travel in the
/// body's `code` field and are interpreted by the caller.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub struct CenterApiClient {
    logger: Logger,
    client: Client,
    base_url: String,
    access_key: String,
    timeout_ms: u64,
}

impl CenterApiClient {
    pub fn new(logger: Logger, config: &CenterConfig) -> Result<Self, ToolError> {
        let client = Client::builder()
            .user_agent(concat!("kaitu-ops/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("center"),
            client,
            base_url: normalize_base_url(&config.url)?,
            access_key: config.access_key.clone(),
            timeout_ms: TIMEOUT_API_REQUEST_MS,
        })
    }

    fn build_headers(&self) -> Result<HeaderMap, ToolError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.access_key)
            .map_err(|_| ToolError::invalid_params("center.access_key is not a valid header value"))?;
        headers.insert(ACCESS_KEY_HEADER, key);
        Ok(headers)
    }
}

#[async_trait]
impl FleetApi for CenterApiClient {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, ToolError> {
        let url = join_url(&self.base_url, path);
        self.logger.debug(
            "request",
            Some(&serde_json::json!({ "method": options.method.as_str(), "url": url })),
        );

        let mut request = self
            .client
            .request(options.method.clone(), &url)
            .headers(self.build_headers()?);
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = tokio::time::timeout(Duration::from_millis(self.timeout_ms), request.send())
            .await
            .map_err(|_| {
                ToolError::timeout(format!(
                    "Center API request timed out after {}ms",
                    self.timeout_ms
                ))
            })?
            .map_err(|err| ToolError::retryable(format!("Center API request failed: {}", err)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ToolError::retryable(format!("Center API read failed: {}", err)))?;
        serde_json::from_str(&text).map_err(|_| {
            ToolError::retryable(format!(
                "Center API returned non-JSON response ({})",
                status.as_u16()
            ))
            .with_details(serde_json::json!({ "url": url }))
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ToolError::invalid_params("center.url is required")
            .with_hint("Set center.url, e.g. \"https://api.example.com\"."));
    }
    let mut url = Url::parse(raw).map_err(|_| {
        ToolError::invalid_params("Invalid center.url")
            .with_hint("Expected a valid URL, e.g. \"https://api.example.com\".")
            .with_details(serde_json::json!({ "url": raw }))
    })?;
    url.set_fragment(None);
    url.set_query(None);
    let normalized = format!("{}{}", url.origin().ascii_serialization(), url.path());
    Ok(normalized.trim_end_matches('/').to_string())
}

/// `api/nodes` and `/api/nodes` resolve to the same URL.
fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base, path.trim_start_matches('/'))
}
