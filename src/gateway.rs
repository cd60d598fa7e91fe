//! Privacy-manager ("blackbox") gateway: the service holding the encrypted payloads of
//! private transactions, addressed by a key derived from the on-chain input.
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

/// Failure to delete a payload at the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered with something other than `204 No Content`.
    #[error("gateway refused delete with status {status}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
    },

    /// The gateway could not be reached.
    #[error("gateway unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// Delete-by-key interface of the privacy manager.
#[async_trait]
pub trait PrivacyGateway: Send + Sync {
    /// Delete the payload stored under `key`. Succeeds only on `204`.
    async fn delete(&self, key: &str) -> Result<(), GatewayError>;
}

/// Content-addressable key for a transaction's input payload: the raw bytes of the hex
/// input (`0x` stripped), URL-safe base64 with padding.
pub fn content_key(input: &str) -> Result<String, hex::FromHexError> {
    let raw = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let bytes = hex::decode(raw)?;
    Ok(general_purpose::URL_SAFE.encode(bytes))
}

/// Gateway over HTTP: `DELETE {base}/transaction/{key}`.
pub struct HttpPrivacyGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPrivacyGateway {
    /// Gateway at `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PrivacyGateway for HttpPrivacyGateway {
    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        let url = format!("{}/transaction/{key}", self.base_url);
        debug!(%url, "deleting private payload");
        let response = self.client.delete(&url).send().await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            other => Err(GatewayError::Rejected {
                status: other.as_u16(),
            }),
        }
    }
}
