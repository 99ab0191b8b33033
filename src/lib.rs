//! Offline cache worker for statically exported web apps.
//!
//! `precache` pre-caches a fixed asset list into a cache bucket named for
//! the deployed version, evicts buckets left behind by older versions, and
//! answers intercepted requests cache-first for known assets and
//! network-first with cache fallback for everything else.
//!
//! # Example
//!
//! ```ignore
//! let manifest = Manifest::load(Path::new("build/manifest.json"))?;
//! let worker = OfflineWorker::new(manifest, Url::parse("https://app.example.com")?)?;
//!
//! // Lifecycle, driven by the host runtime
//! worker.install().await?;
//! worker.activate().await?;
//!
//! // Fetch interception
//! match worker.handle(&request).await? {
//!     FetchOutcome::Respond(response) => serve(response),
//!     FetchOutcome::Bypass => forward_unchanged(request),
//! }
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod manifest;
pub mod net;
pub mod worker;

pub use cache::{BucketStore, CachedEntry, MemoryStore, SqliteStore};
pub use config::ExportConfig;
pub use http::{FetchOutcome, FetchRequest, StoredResponse};
pub use manifest::Manifest;
pub use net::{Fetcher, HttpFetcher};
pub use worker::{HostSignals, NoopHost, OfflineWorker};
