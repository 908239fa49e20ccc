//! HTTP Source Adapter
//!
//! Implements [`BeaconSizeSource`] against the upstream REST API with reqwest.
//!
//! Failure classification:
//! - no response (connect error, timeout, broken body) -> [`SourceError::Network`],
//!   retried once immediately
//! - non-2xx response -> [`SourceError::Status`], message taken from the
//!   `{"error": "..."}` body when present
//! - undecodable body -> [`SourceError::Decode`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{
    BlobFeeData, Block, BlockBlobs, BlockId, SlotRange, SourceError, SourceResult,
};
use crate::ports::outbound::BeaconSizeSource;

/// Upper bound on any single request; per-operation limits are tighter.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest upstream error text kept in a [`SourceError::Status`].
const MAX_ERROR_MESSAGE: usize = 200;

#[derive(Deserialize)]
struct UpstreamErrorBody {
    error: String,
}

/// reqwest-backed upstream source.
#[derive(Clone, Debug)]
pub struct HttpBeaconSizeSource {
    client: Client,
    base_url: String,
}

impl HttpBeaconSizeSource {
    /// Create a source for `base_url` (e.g. `http://localhost:5000/api`).
    pub fn new(base_url: impl Into<String>) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, u64)]) -> SourceResult<T> {
        let url = self.url(path);
        let response = match self.send(&url, query).await {
            Err(e) if e.is_network() => {
                warn!(url = %url, error = %e, "Upstream request failed, retrying once");
                self.send(&url, query).await?
            }
            other => other?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        let body = response.bytes().await.map_err(classify_transport_error)?;
        debug!(url = %url, bytes = body.len(), "Upstream response received");
        serde_json::from_slice(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }

    async fn send(&self, url: &str, query: &[(&str, u64)]) -> SourceResult<Response> {
        self.client
            .get(url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(classify_transport_error)
    }
}

/// Anything that kept a response from arriving is network-class.
fn classify_transport_error(e: reqwest::Error) -> SourceError {
    if e.is_decode() {
        return SourceError::Decode(e.to_string());
    }
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "cannot connect to upstream".to_string()
    } else {
        e.to_string()
    };
    SourceError::Network(reason)
}

fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<UpstreamErrorBody>(body) {
        return parsed.error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_MESSAGE).collect()
    }
}

fn range_query(range: &SlotRange) -> [(&'static str, u64); 2] {
    [("start", range.start()), ("end", range.end())]
}

#[async_trait]
impl BeaconSizeSource for HttpBeaconSizeSource {
    async fn block(&self, id: BlockId) -> SourceResult<Block> {
        self.get(&format!("block/{}", id), &[]).await
    }

    async fn blocks(&self, range: SlotRange) -> SourceResult<Vec<Block>> {
        self.get("blocks", &range_query(&range)).await
    }

    async fn latest(&self) -> SourceResult<Block> {
        self.get("latest", &[]).await
    }

    async fn block_blobs(&self, id: BlockId) -> SourceResult<BlockBlobs> {
        self.get(&format!("blob/{}", id), &[]).await
    }

    async fn blobs(&self, range: SlotRange) -> SourceResult<Vec<BlockBlobs>> {
        self.get("blobs", &range_query(&range)).await
    }

    async fn blob_fee(&self, id: BlockId) -> SourceResult<BlobFeeData> {
        self.get(&format!("blob-fee/{}", id), &[]).await
    }

    async fn blob_fees(&self, range: SlotRange) -> SourceResult<Vec<BlobFeeData>> {
        self.get("blob-fees", &range_query(&range)).await
    }

    fn source_id(&self) -> &str {
        &self.base_url
    }
}
