//! Bucket storage backends: SQLite for persistence, in-memory for tests and
//! throwaway hosts.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};

use super::traits::{BucketStore, CachedEntry};
use crate::http::{FetchRequest, StoredResponse};

/// SQLite-based bucket store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &std::path::Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("precache").join("cache.db"))
  }

  /// Run database migrations for the bucket tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(BUCKET_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the bucket tables.
const BUCKET_SCHEMA: &str = r#"
-- Named cache buckets, one per deployed version
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by request identity
CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_bucket ON entries(bucket);
"#;

impl BucketStore for SqliteStore {
  fn open(&self, bucket: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
        params![bucket],
      )
      .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    Ok(())
  }

  fn populate(&self, bucket: &str, entries: &[(FetchRequest, StoredResponse)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // One transaction for the whole batch: a failure part-way through
    // commits nothing.
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    for (request, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO entries (bucket, request_key, method, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket,
          request.cache_key(),
          request.method.as_str(),
          request.url.as_str(),
          response.status,
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", request.url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn matching(&self, bucket: &str, request: &FetchRequest) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE bucket = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![bucket, request.cache_key()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;

        Ok(Some(CachedEntry {
          response: StoredResponse {
            status,
            headers,
            body,
          },
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &str, request: &FetchRequest, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
        params![bucket],
      )
      .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (bucket, request_key, method, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket,
          request.cache_key(),
          request.method.as_str(),
          request.url.as_str(),
          response.status,
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", request.url, e))?;

    Ok(())
  }

  fn delete(&self, bucket: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries for {}: {}", bucket, e))?;

    let removed = tx
      .execute("DELETE FROM buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// In-memory bucket store.
///
/// Nothing survives the process; used by tests and by hosts that want a
/// throwaway cache.
#[derive(Default)]
pub struct MemoryStore {
  buckets: Mutex<HashMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl BucketStore for MemoryStore {
  fn open(&self, bucket: &str) -> Result<()> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    buckets.entry(bucket.to_string()).or_default();
    Ok(())
  }

  fn populate(&self, bucket: &str, entries: &[(FetchRequest, StoredResponse)]) -> Result<()> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let bucket = buckets.entry(bucket.to_string()).or_default();
    for (request, response) in entries {
      bucket.insert(
        request.cache_key(),
        CachedEntry {
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
    }

    Ok(())
  }

  fn matching(&self, bucket: &str, request: &FetchRequest) -> Result<Option<CachedEntry>> {
    let buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      buckets
        .get(bucket)
        .and_then(|entries| entries.get(&request.cache_key()))
        .cloned(),
    )
  }

  fn put(&self, bucket: &str, request: &FetchRequest, response: &StoredResponse) -> Result<()> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    buckets.entry(bucket.to_string()).or_default().insert(
      request.cache_key(),
      CachedEntry {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );

    Ok(())
  }

  fn delete(&self, bucket: &str) -> Result<bool> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(buckets.remove(bucket).is_some())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<String> = buckets.keys().cloned().collect();
    names.sort();
    Ok(names)
  }
}
