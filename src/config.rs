//! Build-time static export configuration.
//!
//! These settings drive the build and packaging side of a deployment: where
//! the exported pages and assets land, whether the output is precompressed,
//! and what static hosting should serve for unmatched routes. The running
//! worker never reads them; the manifest scan does.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
  /// Directory the exported pages are written to
  pub pages: PathBuf,
  /// Directory the static assets are written to
  pub assets: PathBuf,
  /// Precompress output files for static hosting
  pub precompress: bool,
  /// Fail the export when a route cannot be rendered statically
  pub strict: bool,
  /// Fallback document served for routes with no exported page
  pub fallback: Option<String>,
}

impl Default for ExportConfig {
  fn default() -> Self {
    Self {
      pages: PathBuf::from("build"),
      assets: PathBuf::from("build"),
      precompress: false,
      strict: true,
      fallback: None,
    }
  }
}

impl ExportConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./precache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/precache/config.yaml
  ///
  /// Every field has a default, so a missing file just means defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("precache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("precache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: ExportConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
