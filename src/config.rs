//! # Configuration Management
//!
//! Loads runtime settings from `tidecast.toml`: where the tile cache lives
//! and how big it may grow, the manifest signature policy and publisher key,
//! and prediction sampling defaults. Missing or invalid files fall back to
//! defaults so an offline device always comes up in a working state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::manifest::SignaturePolicy;
use crate::predictor::Unit;

/// Application configuration loaded from tidecast.toml.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub manifest: ManifestConfig,
    pub prediction: PredictionConfig,
}

/// Tile cache location and quotas.
#[derive(Debug, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Directory holding the cache index and tile blobs.
    pub dir: String,
    pub max_tiles: usize,
    pub max_bytes: u64,
}

/// Manifest source and trust settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct ManifestConfig {
    /// Path of the most recently accepted manifest JSON.
    pub path: String,
    /// Publisher's Ed25519 public key, 32 bytes hex. Empty means no key is
    /// configured, which only works under the permissive policy.
    pub public_key_hex: String,
    /// `require` in production; `allow_unverified` for development feeds.
    pub signature_policy: SignaturePolicy,
}

/// Prediction sampling defaults applied when a request leaves them unset.
#[derive(Debug, Deserialize, Serialize)]
pub struct PredictionConfig {
    pub step_minutes: i64,
    pub unit: Unit,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache: CacheConfig {
                dir: "tidecast-cache".to_string(),
                max_tiles: 64,
                max_bytes: 32 * 1024 * 1024,
            },
            manifest: ManifestConfig {
                path: "manifest.json".to_string(),
                public_key_hex: String::new(),
                signature_policy: SignaturePolicy::Require,
            },
            prediction: PredictionConfig {
                step_minutes: 15,
                unit: Unit::M,
            },
        }
    }
}

impl Config {
    /// Load configuration from tidecast.toml in the working directory.
    /// Falls back to defaults if the file is missing or invalid.
    pub fn load() -> Self {
        Self::load_from_path("tidecast.toml")
    }

    /// Load configuration from a specific path, with default fallback.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Persist the current configuration to tidecast.toml.
    pub fn save(&self) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write("tidecast.toml", contents)?;
        Ok(())
    }

    pub fn cache_limits(&self) -> crate::cache::CacheLimits {
        crate::cache::CacheLimits {
            max_tiles: self.cache.max_tiles,
            max_bytes: self.cache.max_bytes,
        }
    }
}
