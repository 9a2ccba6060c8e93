//! HTTP client for the safety event endpoints
//!
//! Each event is one `POST` of its JSON payload to the kind's path. Every
//! request carries an `Idempotency-Key` derived from the payload so a
//! receiver can drop replays of events it already accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::types::{idempotency_key, EventKind};

use super::DeliveryClient;

/// Header carrying the payload's content hash
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// HTTP client for the delivery endpoint
pub struct HttpDeliveryClient {
    config: EndpointConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpDeliveryClient {
    /// Create a new delivery client from configuration
    ///
    /// Returns an error if the configuration is invalid or has no server URL.
    pub fn new(config: EndpointConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("endpoint.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        // The timeout bounds every call, so one hung request cannot stall a sync
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    /// Full URL for an event kind
    pub fn endpoint_url(&self, kind: EventKind) -> String {
        format!("{}{}", self.base_url, self.config.path_for(kind))
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, kind: EventKind, payload: &serde_json::Value) -> Result<()> {
        let url = self.endpoint_url(kind);
        let key = idempotency_key(kind, payload);

        let response = self
            .http_client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, key.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Http(format!("request to {} timed out", url))
                } else {
                    Error::Http(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();

        if status.is_success() {
            tracing::debug!(kind = %kind, idempotency_key = %key, %status, "Event delivered");
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Delivery {
                kind,
                message: format!("API error ({}): {}", status, error_text),
            })
        }
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}{}", self.base_url, self.config.health_path);

        match self.http_client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                Ok(false)
            }
        }
    }
}
