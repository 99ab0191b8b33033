//! Deployment manifest: the version tag plus the fixed asset list.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ExportConfig;

/// How many hex characters of the output hash make up a version tag.
const VERSION_TAG_LEN: usize = 16;

/// Version tag plus the ordered list of URL paths to pre-cache.
///
/// Produced once per deployment by the build pipeline and immutable for the
/// lifetime of a worker instance. The version tag changes on every deploy,
/// which is what lets `activate` recognize and evict stale buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
  version: String,
  assets: Vec<String>,
}

impl Manifest {
  pub fn new(version: impl Into<String>, assets: Vec<String>) -> Self {
    Self {
      version: version.into(),
      assets,
    }
  }

  /// Load a manifest file emitted by the build pipeline.
  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read manifest {}: {}", path.display(), e))?;

    serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse manifest {}: {}", path.display(), e))
  }

  /// Build a manifest by scanning a static export.
  ///
  /// Walks the pages and assets output directories, maps every file to an
  /// absolute URL path (`index.html` also maps to `/`) and derives the
  /// version tag from a hash over the output, so the tag changes whenever a
  /// deployment changes a single byte.
  pub fn scan(config: &ExportConfig) -> Result<Self> {
    let mut files = BTreeSet::new();
    collect_files(&config.pages, &config.pages, &mut files)?;
    if config.assets != config.pages {
      collect_files(&config.assets, &config.assets, &mut files)?;
    }

    let mut hasher = Sha256::new();
    let mut assets = Vec::new();
    for (rel, full) in &files {
      let bytes =
        std::fs::read(full).map_err(|e| eyre!("Failed to read {}: {}", full.display(), e))?;
      hasher.update(rel.as_bytes());
      hasher.update(&bytes);

      if rel == "index.html" {
        assets.push("/".to_string());
      }
      assets.push(format!("/{}", rel));
    }

    let digest = hex::encode(hasher.finalize());
    Ok(Self {
      version: digest[..VERSION_TAG_LEN].to_string(),
      assets,
    })
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Bucket name for this version: `cache-<version>`.
  pub fn bucket_name(&self) -> String {
    format!("cache-{}", self.version)
  }

  /// Whether a URL path is part of the pre-cached asset list.
  pub fn contains(&self, path: &str) -> bool {
    self.assets.iter().any(|a| a == path)
  }
}

/// Collect every file under `dir` as (path relative to `root`, full path).
///
/// The BTreeSet keeps the walk order deterministic so the version hash is
/// reproducible for identical output.
fn collect_files(
  root: &Path,
  dir: &Path,
  out: &mut BTreeSet<(String, PathBuf)>,
) -> Result<()> {
  let entries = std::fs::read_dir(dir)
    .map_err(|e| eyre!("Failed to read export directory {}: {}", dir.display(), e))?;

  for entry in entries {
    let entry =
      entry.map_err(|e| eyre!("Failed to read export directory {}: {}", dir.display(), e))?;
    let path = entry.path();

    if path.is_dir() {
      collect_files(root, &path, out)?;
    } else {
      let rel = path
        .strip_prefix(root)
        .map_err(|e| eyre!("File {} outside export root: {}", path.display(), e))?
        .to_string_lossy()
        .replace('\\', "/");
      out.insert((rel, path));
    }
  }

  Ok(())
}
