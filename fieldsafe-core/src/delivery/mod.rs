//! Delivery of safety events to the remote endpoint
//!
//! The sync service talks to the server only through [`DeliveryClient`], so
//! tests and offline-only deployments can swap the transport.
//!
//! ## Usage
//!
//! Point the client at a server in `~/.config/fieldsafe/config.toml`:
//!
//! ```toml
//! [endpoint]
//! server_url = "https://safety.example.org"
//! api_key = "sk_xxxxxxxxxxxx"
//! ```
//!
//! Without a `server_url`, [`client_for`] returns [`NoEndpoint`], which reports
//! the device as offline so every event stays queued locally.

mod client;

pub use client::HttpDeliveryClient;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::types::EventKind;

/// Transport for a single event delivery.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Send one payload to the kind's endpoint
    ///
    /// `Ok(())` only when the server acknowledged the event (2xx). Network
    /// errors, timeouts and non-2xx responses are all errors.
    async fn deliver(&self, kind: EventKind, payload: &serde_json::Value) -> Result<()>;

    /// Whether the server is reachable right now
    async fn health_check(&self) -> Result<bool>;
}

/// Stand-in used when no server is configured. Never delivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEndpoint;

#[async_trait]
impl DeliveryClient for NoEndpoint {
    async fn deliver(&self, kind: EventKind, _payload: &serde_json::Value) -> Result<()> {
        Err(Error::Delivery {
            kind,
            message: "no delivery endpoint configured".to_string(),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Build the delivery client matching the configuration
pub fn client_for(config: &EndpointConfig) -> Result<Arc<dyn DeliveryClient>> {
    if config.is_ready() {
        Ok(Arc::new(HttpDeliveryClient::new(config.clone())?))
    } else {
        Ok(Arc::new(NoEndpoint))
    }
}
