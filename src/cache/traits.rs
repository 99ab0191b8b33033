//! Core trait and types for bucket storage backends.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{FetchRequest, StoredResponse};

/// A stored response together with its storage metadata.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: StoredResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for bucket storage backends.
///
/// Implementations serialize access to the underlying storage internally, so
/// concurrent handlers racing to populate the same key are safe; the last
/// write wins.
pub trait BucketStore: Send + Sync {
  /// Create the bucket if it does not exist yet.
  fn open(&self, bucket: &str) -> Result<()>;

  /// Store all entries in one bulk operation.
  ///
  /// Either every entry is committed or none are. Existing entries for the
  /// same requests are replaced, so repopulating with identical content is a
  /// no-op as far as readers can tell.
  fn populate(&self, bucket: &str, entries: &[(FetchRequest, StoredResponse)]) -> Result<()>;

  /// Look up a previously stored response matching this exact request.
  fn matching(&self, bucket: &str, request: &FetchRequest) -> Result<Option<CachedEntry>>;

  /// Store a single response, replacing any previous entry for the request.
  fn put(&self, bucket: &str, request: &FetchRequest, response: &StoredResponse) -> Result<()>;

  /// Delete a bucket and everything in it. Returns whether it existed.
  fn delete(&self, bucket: &str) -> Result<bool>;

  /// Names of all buckets present in this store.
  fn bucket_names(&self) -> Result<Vec<String>>;
}
