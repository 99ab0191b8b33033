//! Network fetch primitive behind the worker.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};

use crate::http::{FetchRequest, StoredResponse};

/// Trait for the network side of the worker.
///
/// `Err` means the request never produced a response (connection refused,
/// DNS failure, ...). Anything the server actually sent comes back as `Ok`,
/// whatever its status code.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse>;
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    // A connection dropped mid-body is a network failure too
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?
      .to_vec();

    Ok(StoredResponse {
      status,
      headers,
      body,
    })
  }
}
