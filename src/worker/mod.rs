//! The offline cache worker: versioned pre-caching plus a cache-first,
//! network-fallback fetch policy.
//!
//! One worker instance serves one deployed version. The host runtime drives
//! its lifecycle: `install` once when the version is first seen, `activate`
//! once when it becomes the controlling instance, then `handle` for every
//! intercepted request until the host shuts down.

mod host;

pub use host::{HostSignals, NoopHost};

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{BucketStore, SqliteStore};
use crate::http::{FetchOutcome, FetchRequest, StoredResponse};
use crate::manifest::Manifest;
use crate::net::{Fetcher, HttpFetcher};

/// Offline cache worker for one deployed version.
///
/// Owns the bucket named for its version tag and zero other mutable state.
/// All asset paths in the manifest resolve against `origin`.
pub struct OfflineWorker<S: BucketStore> {
  manifest: Manifest,
  origin: Url,
  bucket: String,
  store: Arc<S>,
  fetcher: Arc<dyn Fetcher>,
  host: Arc<dyn HostSignals>,
}

impl OfflineWorker<SqliteStore> {
  /// Worker with the default wiring: on-disk SQLite buckets, a reqwest
  /// fetcher, and a host with no lifecycle.
  pub fn new(manifest: Manifest, origin: Url) -> Result<Self> {
    let store = Arc::new(SqliteStore::open()?);
    let fetcher = Arc::new(HttpFetcher::new()?);

    Ok(Self::with_parts(
      manifest,
      origin,
      store,
      fetcher,
      Arc::new(NoopHost),
    ))
  }
}

impl<S: BucketStore + 'static> OfflineWorker<S> {
  /// Worker with explicit storage, fetcher, and host wiring.
  pub fn with_parts(
    manifest: Manifest,
    origin: Url,
    store: Arc<S>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn HostSignals>,
  ) -> Self {
    let bucket = manifest.bucket_name();

    Self {
      manifest,
      origin,
      bucket,
      store,
      fetcher,
      host,
    }
  }

  /// Name of the bucket this worker serves from.
  pub fn bucket(&self) -> &str {
    &self.bucket
  }

  /// Populate this version's bucket with every manifest asset.
  ///
  /// All assets are fetched up front and committed in one bulk operation. If
  /// any single fetch fails, or comes back non-2xx, the whole install fails
  /// and nothing is committed; the host decides when to retry. On success
  /// the host is told to skip the waiting phase.
  pub async fn install(&self) -> Result<()> {
    self.store.open(&self.bucket)?;

    let fetches = self
      .manifest
      .assets()
      .iter()
      .map(|path| self.fetch_asset(path));
    let entries = futures::future::try_join_all(fetches).await?;

    self.store.populate(&self.bucket, &entries)?;
    self.host.skip_waiting();

    Ok(())
  }

  async fn fetch_asset(&self, path: &str) -> Result<(FetchRequest, StoredResponse)> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid asset path {}: {}", path, e))?;

    let request = FetchRequest::get(url);
    let response = self.fetcher.fetch(&request).await?;

    if !response.is_success() {
      return Err(eyre!(
        "Asset {} returned status {} during install",
        path,
        response.status
      ));
    }

    Ok((request, response))
  }

  /// Evict buckets left behind by previous versions.
  ///
  /// Completes only after every stale bucket is gone, then claims the
  /// currently connected clients.
  pub async fn activate(&self) -> Result<()> {
    for name in self.store.bucket_names()? {
      if name != self.bucket {
        self.store.delete(&name)?;
        debug!(bucket = %name, "Deleted stale cache bucket");
      }
    }

    self.host.claim_clients();

    Ok(())
  }

  /// Run one request through the interception policy.
  ///
  /// Pre-cached assets are served from the bucket without touching the
  /// network; everything else goes network-first with the bucket as
  /// fallback. Network failures never surface as errors, only bucket
  /// storage failures do.
  pub async fn handle(&self, request: &FetchRequest) -> Result<FetchOutcome> {
    if request.method != Method::GET {
      return Ok(FetchOutcome::Bypass);
    }

    if self.manifest.contains(request.url.path()) {
      if let Some(entry) = self.store.matching(&self.bucket, request)? {
        return Ok(FetchOutcome::Respond(entry.response));
      }

      // Install put every manifest asset in the bucket, so a miss here
      // points at a population gap; fall back to the network anyway.
      warn!(url = %request.url, "Manifest asset missing from cache");
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.status == 200 && request.is_network_scheme() {
          self.put_background(request.clone(), response.clone());
        }

        Ok(FetchOutcome::Respond(response))
      }
      Err(error) => {
        debug!(url = %request.url, %error, "Network fetch failed, trying cache");

        match self.store.matching(&self.bucket, request)? {
          Some(entry) => Ok(FetchOutcome::Respond(entry.response)),
          None => Ok(FetchOutcome::Respond(StoredResponse::not_found())),
        }
      }
    }
  }

  /// Store a fetched response without blocking the caller.
  fn put_background(&self, request: FetchRequest, response: StoredResponse) {
    let store = Arc::clone(&self.store);
    let bucket = self.bucket.clone();

    tokio::spawn(async move {
      if let Err(error) = store.put(&bucket, &request, &response) {
        debug!(url = %request.url, %error, "Failed to cache response");
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  struct StubFetcher {
    routes: Mutex<HashMap<String, StoredResponse>>,
    offline: AtomicBool,
    calls: AtomicUsize,
  }

  impl StubFetcher {
    fn new() -> Self {
      Self {
        routes: Mutex::new(HashMap::new()),
        offline: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
      }
    }

    fn serve(&self, url: &str, response: StoredResponse) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    fn reset_calls(&self) {
      self.calls.store(0, Ordering::SeqCst);
    }
  }

  #[async_trait::async_trait]
  impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("connection refused"));
      }

      self
        .routes
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .ok_or_else(|| eyre!("no route to {}", request.url))
    }
  }

  #[derive(Default)]
  struct RecordingHost {
    skipped: AtomicBool,
    claimed: AtomicBool,
  }

  impl HostSignals for RecordingHost {
    fn skip_waiting(&self) {
      self.skipped.store(true, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
      self.claimed.store(true, Ordering::SeqCst);
    }
  }

  struct Fixture {
    worker: OfflineWorker<MemoryStore>,
    store: Arc<MemoryStore>,
    fetcher: Arc<StubFetcher>,
    host: Arc<RecordingHost>,
  }

  fn fixture(manifest: Manifest) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new());
    let host = Arc::new(RecordingHost::default());

    let worker = OfflineWorker::with_parts(
      manifest,
      Url::parse("http://localhost").unwrap(),
      Arc::clone(&store),
      Arc::clone(&fetcher) as Arc<dyn Fetcher>,
      Arc::clone(&host) as Arc<dyn HostSignals>,
    );

    Fixture {
      worker,
      store,
      fetcher,
      host,
    }
  }

  fn v1_manifest() -> Manifest {
    Manifest::new("v1", vec!["/".to_string(), "/app.js".to_string()])
  }

  fn get(url: &str) -> FetchRequest {
    FetchRequest::get(Url::parse(url).unwrap())
  }

  async fn settle() {
    // Let spawned cache writes land
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  #[tokio::test]
  async fn test_install_populates_every_manifest_asset() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/", StoredResponse::new(200, "index"));
    f.fetcher.serve("http://localhost/app.js", StoredResponse::new(200, "js"));

    f.worker.install().await.unwrap();

    for url in ["http://localhost/", "http://localhost/app.js"] {
      let entry = f.store.matching("cache-v1", &get(url)).unwrap();
      assert!(entry.is_some(), "missing entry for {}", url);
    }
    assert!(f.host.skipped.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_install_commits_nothing_when_an_asset_is_unreachable() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/", StoredResponse::new(200, "index"));
    // /app.js has no route, so its fetch fails

    assert!(f.worker.install().await.is_err());

    let entry = f.store.matching("cache-v1", &get("http://localhost/")).unwrap();
    assert!(entry.is_none(), "partial install must not commit");
    assert!(!f.host.skipped.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_install_rejects_non_success_asset() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/", StoredResponse::new(200, "index"));
    f.fetcher.serve("http://localhost/app.js", StoredResponse::new(500, "boom"));

    assert!(f.worker.install().await.is_err());
  }

  #[tokio::test]
  async fn test_install_twice_is_idempotent() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/", StoredResponse::new(200, "index"));
    f.fetcher.serve("http://localhost/app.js", StoredResponse::new(200, "js"));

    f.worker.install().await.unwrap();
    f.worker.install().await.unwrap();

    let entry = f
      .store
      .matching("cache-v1", &get("http://localhost/app.js"))
      .unwrap()
      .unwrap();
    assert_eq!(entry.response.body, b"js");
    assert_eq!(f.store.bucket_names().unwrap(), ["cache-v1"]);
  }

  #[tokio::test]
  async fn test_manifest_asset_served_without_network() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/", StoredResponse::new(200, "index"));
    f.fetcher.serve("http://localhost/app.js", StoredResponse::new(200, "js"));
    f.worker.install().await.unwrap();
    f.fetcher.reset_calls();

    let outcome = f.worker.handle(&get("http://localhost/app.js")).await.unwrap();

    assert_eq!(outcome.response().unwrap().body, b"js");
    assert_eq!(f.fetcher.calls(), 0, "cache-first must not hit the network");
  }

  #[tokio::test]
  async fn test_non_get_requests_bypass() {
    let f = fixture(v1_manifest());
    let request = FetchRequest::new(Method::POST, Url::parse("http://localhost/app.js").unwrap());

    let outcome = f.worker.handle(&request).await.unwrap();

    assert_eq!(outcome, FetchOutcome::Bypass);
    assert_eq!(f.fetcher.calls(), 0);
    assert!(f.store.matching("cache-v1", &request).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_manifest_miss_falls_through_to_network() {
    let f = fixture(v1_manifest());
    // Bucket never populated; the asset should still come back via network
    f.fetcher.serve("http://localhost/app.js", StoredResponse::new(200, "js"));

    let outcome = f.worker.handle(&get("http://localhost/app.js")).await.unwrap();

    assert_eq!(outcome.response().unwrap().body, b"js");
    assert_eq!(f.fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_successful_uncached_fetch_is_stored() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/api/data", StoredResponse::new(200, "data"));

    let outcome = f.worker.handle(&get("http://localhost/api/data")).await.unwrap();
    assert_eq!(outcome.response().unwrap().status, 200);

    settle().await;
    let entry = f
      .store
      .matching("cache-v1", &get("http://localhost/api/data"))
      .unwrap();
    assert!(entry.is_some(), "200 response should be cached");
  }

  #[tokio::test]
  async fn test_non_200_response_is_not_cached() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/gone", StoredResponse::new(404, "nope"));

    let outcome = f.worker.handle(&get("http://localhost/gone")).await.unwrap();
    assert_eq!(outcome.response().unwrap().status, 404);

    settle().await;
    let entry = f.store.matching("cache-v1", &get("http://localhost/gone")).unwrap();
    assert!(entry.is_none());
  }

  #[tokio::test]
  async fn test_non_network_scheme_is_not_cached() {
    let f = fixture(v1_manifest());
    let url = "chrome-extension://abcdef/page.html";
    f.fetcher.serve(url, StoredResponse::new(200, "ext"));

    let outcome = f.worker.handle(&get(url)).await.unwrap();
    assert_eq!(outcome.response().unwrap().body, b"ext");

    settle().await;
    assert!(f.store.matching("cache-v1", &get(url)).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_network_failure_falls_back_to_cached_copy() {
    let f = fixture(v1_manifest());
    f.fetcher.serve("http://localhost/api/data", StoredResponse::new(200, "data"));

    f.worker.handle(&get("http://localhost/api/data")).await.unwrap();
    settle().await;

    f.fetcher.set_offline(true);
    let outcome = f.worker.handle(&get("http://localhost/api/data")).await.unwrap();

    assert_eq!(outcome.response().unwrap().body, b"data");
  }

  #[tokio::test]
  async fn test_network_failure_without_cache_is_synthetic_404() {
    let f = fixture(v1_manifest());
    f.fetcher.set_offline(true);

    let outcome = f.worker.handle(&get("http://localhost/unknown")).await.unwrap();

    let response = outcome.response().unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, b"Not found");
  }

  #[tokio::test]
  async fn test_activate_evicts_every_other_bucket() {
    let f = fixture(v1_manifest());
    f.store.open("cache-v0").unwrap();
    f.store.open("cache-v1").unwrap();
    f.store.open("someother").unwrap();

    f.worker.activate().await.unwrap();

    assert_eq!(f.store.bucket_names().unwrap(), ["cache-v1"]);
    assert!(f.host.claimed.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_activate_with_no_stale_buckets_succeeds() {
    let f = fixture(v1_manifest());
    f.store.open("cache-v1").unwrap();

    f.worker.activate().await.unwrap();

    assert_eq!(f.store.bucket_names().unwrap(), ["cache-v1"]);
  }

  #[tokio::test]
  async fn test_new_deploy_replaces_old_bucket() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::new());
    fetcher.serve("http://localhost/", StoredResponse::new(200, "one"));
    fetcher.serve("http://localhost/app.js", StoredResponse::new(200, "one"));

    let origin = Url::parse("http://localhost").unwrap();
    let v1 = OfflineWorker::with_parts(
      v1_manifest(),
      origin.clone(),
      Arc::clone(&store),
      Arc::clone(&fetcher) as Arc<dyn Fetcher>,
      Arc::new(NoopHost),
    );
    v1.install().await.unwrap();
    v1.activate().await.unwrap();

    let v2 = OfflineWorker::with_parts(
      Manifest::new("v2", vec!["/".to_string()]),
      origin,
      Arc::clone(&store),
      Arc::clone(&fetcher) as Arc<dyn Fetcher>,
      Arc::new(NoopHost),
    );
    v2.install().await.unwrap();
    v2.activate().await.unwrap();

    assert_eq!(store.bucket_names().unwrap(), ["cache-v2"]);
  }
}
