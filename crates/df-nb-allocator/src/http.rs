//! HTTP client for a remote allocation authority.
//!
//! Protocol:
//!
//! | Request | Response |
//! |---------|----------|
//! | `POST {base_url}/v1/unique-keys/{partition}` | `200` with `{"unique_key": n}` |
//! | | `409` or `507`: partition key space exhausted |
//!
//! Any other status, transport error, or malformed body reports the
//! authority as unavailable. Keys are strictly positive.

use crate::authority::{AllocationAuthority, AllocationError};
use df_nb_core::{PartitionName, UniqueKey};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Characters escaped in the partition path segment.
const PATH_SEGMENT_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// HTTP authority configuration.
#[derive(Debug, Clone)]
pub struct HttpAuthorityConfig {
    /// Base URL of the allocation service (e.g., <http://localhost:8090>)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Optional bearer token for authentication
    pub bearer_token: Option<String>,
}

impl Default for HttpAuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            timeout: Duration::from_secs(10),
            bearer_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AllocateResponse {
    unique_key: u64,
}

/// Allocation authority reached over HTTP.
///
/// The underlying client is safe for concurrent use; concurrent callers
/// share its connection pool.
pub struct HttpAuthority {
    client: Client,
    config: HttpAuthorityConfig,
}

impl HttpAuthority {
    /// Create a new HTTP authority client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: HttpAuthorityConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, partition: &PartitionName) -> String {
        format!(
            "{}/v1/unique-keys/{}",
            self.config.base_url.trim_end_matches('/'),
            utf8_percent_encode(partition.as_str(), PATH_SEGMENT_ESCAPE)
        )
    }

    fn auth_header(&self) -> Option<String> {
        self.config
            .bearer_token
            .as_ref()
            .map(|t| format!("Bearer {t}"))
    }
}

impl AllocationAuthority for HttpAuthority {
    async fn allocate_unique_key(
        &self,
        partition: &PartitionName,
    ) -> Result<UniqueKey, AllocationError> {
        let url = self.url(partition);

        tracing::debug!(partition = %partition, url, "POST unique key");

        let mut request = self.client.post(&url);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AllocationError::unavailable(partition, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::INSUFFICIENT_STORAGE {
            return Err(AllocationError::exhausted(partition));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AllocationError::unavailable(
                partition,
                format!("status {}: {message}", status.as_u16()),
            ));
        }

        let body: AllocateResponse = response
            .json()
            .await
            .map_err(|e| AllocationError::unavailable(partition, e.to_string()))?;

        if body.unique_key == 0 {
            return Err(AllocationError::unavailable(
                partition,
                "authority returned key 0",
            ));
        }

        Ok(UniqueKey(body.unique_key))
    }
}
