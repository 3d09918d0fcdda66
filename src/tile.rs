//! # Tile Payload Encoding and Decoding
//!
//! A tile's payload travels as a gzip blob whose decompressed form is JSON:
//! constituents plus optional minor-constituent rules, local calibration
//! offsets, datum transforms, and observed statistics. Payloads are decoded
//! per orchestration call and never cached in decoded form — the cache holds
//! only the compressed bytes.
//!
//! Decoding tolerates the loose parts of the format explicitly: a missing
//! `speedDegHr` resolves from the constituent catalog by name, and a name the
//! catalog doesn't know is *dropped and reported*, never silently kept with a
//! made-up speed.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constituents::{speed_of, Constituent};

/// SHA-256 of `bytes`, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One constituent as it appears on the wire; speed is optional.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadConstituent {
    pub name: String,
    /// Amplitude in meters.
    pub amplitude: f64,
    /// Phase lag in degrees.
    pub phase: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_deg_hr: Option<f64>,
}

/// Location-specific amplitude/phase adjustment merged before synthesis.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationEntry {
    pub name: String,
    #[serde(default)]
    pub amplitude_offset: f64,
    #[serde(default)]
    pub phase_offset: f64,
}

/// Observed water-level statistics the publisher baked into the tile.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_level: Option<f64>,
}

/// Decoded contents of one tile blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilePayload {
    pub tile_id: String,
    pub constituents: Vec<PayloadConstituent>,
    /// Inference rules for minor constituents; opaque to the engine today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor_rules: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_calibration: Option<Vec<CalibrationEntry>>,
    /// Offsets (meters) from the tile's native datum to other datums.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum_transforms: Option<HashMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TileStats>,
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload decompression failed: {0}")]
    Decompress(#[from] std::io::Error),
    #[error("payload is not valid tile JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl TilePayload {
    /// Decode a compressed blob.
    pub fn decode(compressed: &[u8]) -> Result<Self, PayloadError> {
        let mut raw = Vec::new();
        GzDecoder::new(compressed).read_to_end(&mut raw)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Decode and verify the manifest checksum (SHA-256 hex over the
    /// *decompressed* bytes).
    pub fn decode_verified(compressed: &[u8], expected_checksum: &str) -> Result<Self, PayloadError> {
        let mut raw = Vec::new();
        GzDecoder::new(compressed).read_to_end(&mut raw)?;
        let actual = sha256_hex(&raw);
        if !actual.eq_ignore_ascii_case(expected_checksum) {
            return Err(PayloadError::ChecksumMismatch {
                expected: expected_checksum.to_string(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Encode to a compressed blob. Publisher tooling and test fixtures.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        use std::io::Write;
        let raw = serde_json::to_vec(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }

    /// Checksum of the decompressed form, as a manifest would carry it.
    pub fn checksum(&self) -> Result<String, PayloadError> {
        Ok(sha256_hex(&serde_json::to_vec(self)?))
    }

    /// Resolve the payload into synthesis-ready constituents.
    ///
    /// Merges local calibration offsets, fills missing speeds from the
    /// catalog, and drops constituents whose speed cannot be resolved. The
    /// dropped names come back so the orchestrator can flag the degradation.
    pub fn resolve(&self) -> ResolvedConstituents {
        let calibration: HashMap<&str, &CalibrationEntry> = self
            .local_calibration
            .iter()
            .flatten()
            .map(|c| (c.name.as_str(), c))
            .collect();

        let mut constituents = Vec::with_capacity(self.constituents.len());
        let mut dropped = Vec::new();
        for pc in &self.constituents {
            let speed = match pc.speed_deg_hr.or_else(|| speed_of(&pc.name)) {
                Some(s) if s > 0.0 => s,
                _ => {
                    dropped.push(pc.name.clone());
                    continue;
                }
            };
            let (mut amplitude, mut phase) = (pc.amplitude, pc.phase);
            if let Some(cal) = calibration.get(pc.name.as_str()) {
                amplitude += cal.amplitude_offset;
                phase += cal.phase_offset;
            }
            constituents.push(Constituent::new(
                &pc.name,
                amplitude.max(0.0),
                phase.rem_euclid(360.0),
                speed,
            ));
        }

        ResolvedConstituents {
            constituents,
            dropped,
        }
    }

    /// Baseline offset to apply for a requested datum, if the tile knows it.
    pub fn datum_offset_m(&self, datum: &str) -> Option<f64> {
        self.datum_transforms
            .as_ref()
            .and_then(|t| t.get(datum).copied())
    }
}

/// Outcome of [`TilePayload::resolve`].
#[derive(Clone, Debug)]
pub struct ResolvedConstituents {
    pub constituents: Vec<Constituent>,
    /// Names that had no resolvable speed and were excluded.
    pub dropped: Vec<String>,
}
