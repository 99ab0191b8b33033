//! Request and response model shared by the cache buckets and the worker.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// An outgoing request as seen by the fetch interception handler.
///
/// Request identity is method plus full URL; two requests with the same
/// identity hit the same bucket entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
}

impl FetchRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self { method, url }
  }

  /// A plain GET for the given URL.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Stable, fixed-length key for this request's identity.
  pub fn cache_key(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Whether the request goes out over a standard network scheme.
  ///
  /// Extension and other non-network schemes never get their responses
  /// cached.
  pub fn is_network_scheme(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }
}

/// A fully buffered response that can be stored in a bucket and replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Attach a header, keeping any already present.
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// The synthetic response served when both network and cache come up empty.
  pub fn not_found() -> Self {
    Self::new(404, "Not found")
  }
}

/// What the interception handler decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Mutating method: not intercepted, the request must go out untouched.
  Bypass,
  /// Intercepted and answered, from cache or network.
  Respond(StoredResponse),
}

impl FetchOutcome {
  /// The response, if the request was intercepted.
  pub fn response(&self) -> Option<&StoredResponse> {
    match self {
      FetchOutcome::Respond(response) => Some(response),
      FetchOutcome::Bypass => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_is_stable() {
    let a = FetchRequest::get(url("https://example.com/app.js"));
    let b = FetchRequest::get(url("https://example.com/app.js"));
    assert_eq!(a.cache_key(), b.cache_key());
    assert_eq!(a.cache_key().len(), 64);
  }

  #[test]
  fn test_cache_key_depends_on_method_and_url() {
    let get = FetchRequest::get(url("https://example.com/data"));
    let head = FetchRequest::new(Method::HEAD, url("https://example.com/data"));
    let other = FetchRequest::get(url("https://example.com/other"));
    assert_ne!(get.cache_key(), head.cache_key());
    assert_ne!(get.cache_key(), other.cache_key());
  }

  #[test]
  fn test_network_scheme() {
    assert!(FetchRequest::get(url("http://example.com/")).is_network_scheme());
    assert!(FetchRequest::get(url("https://example.com/")).is_network_scheme());
    assert!(!FetchRequest::get(url("chrome-extension://abcdef/page.html")).is_network_scheme());
  }

  #[test]
  fn test_not_found_response() {
    let response = StoredResponse::not_found();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, b"Not found");
    assert!(!response.is_success());
  }
}
