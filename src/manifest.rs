//! # Tile Manifest Parsing, Validation and Signature Verification
//!
//! A manifest is a signed JSON index of the tiles a deployment publishes:
//! bounding boxes, versions, payload checksums. Manifests are whole-object
//! replacements — there is no incremental patching; a manifest that fails
//! validation leaves the previously accepted one in force.
//!
//! The detached Ed25519 signature covers the *canonicalized* manifest body:
//! the JSON object with the `signature` member removed, re-serialized with
//! lexicographically sorted keys, hashed with SHA-256. Verification policy is
//! explicit: production deployments run [`SignaturePolicy::Require`] (the
//! strict default); `AllowUnverified` exists for development and marks the
//! manifest as untrusted.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Identifies one geographic tile inside a manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileMeta {
    pub tile_id: String,
    /// Source model the tile's harmonics were derived from (e.g. "fes2014").
    pub model: String,
    /// Vertical datum the tile's levels are referenced to (e.g. "MSL").
    pub datum: String,
    /// `[min_lon, min_lat, max_lon, max_lat]`, degrees.
    pub bbox: [f64; 4],
    /// `[lon, lat]` of the tile's representative point, degrees.
    pub centroid: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_hint: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
    /// SHA-256 (hex) over the decompressed payload bytes.
    pub checksum: String,
    pub compressed_size_bytes: u64,
}

impl TileMeta {
    /// Whether `lon`/`lat` lies inside this tile's bounding box (inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let [min_lon, min_lat, max_lon, max_lat] = self.bbox;
        (min_lon..=max_lon).contains(&lon) && (min_lat..=max_lat).contains(&lat)
    }
}

/// A signed index of available tiles. Immutable once parsed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileManifest {
    pub version: u32,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Reference to the ephemerides table the publisher used.
    pub ephemerides_ref: String,
    pub tiles: Vec<TileMeta>,
    /// Detached Ed25519 signature, hex. Absent only in development feeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("malformed manifest: {0}")]
    Malformed(String),
    #[error("manifest signature missing but policy requires one")]
    SignatureMissing,
    #[error("manifest signature invalid")]
    SignatureInvalid,
    #[error("manifest expired at {0}")]
    Expired(DateTime<Utc>),
}

/// Parse and structurally validate a manifest from raw JSON.
///
/// Signature verification is separate (see [`ManifestVerifier`]) so callers
/// can parse development feeds without a key while still getting the full
/// structural checks.
pub fn parse(raw: &str) -> Result<TileManifest, ManifestError> {
    let manifest: TileManifest =
        serde_json::from_str(raw).map_err(|e| ManifestError::Malformed(e.to_string()))?;
    validate(&manifest)?;
    Ok(manifest)
}

fn validate(manifest: &TileManifest) -> Result<(), ManifestError> {
    if manifest.version == 0 {
        return Err(ManifestError::Malformed("version must be >= 1".into()));
    }
    if let Some(until) = manifest.valid_until {
        if until <= manifest.issued_at {
            return Err(ManifestError::Malformed(
                "validUntil precedes issuedAt".into(),
            ));
        }
    }
    for tile in &manifest.tiles {
        validate_tile(tile)?;
    }
    Ok(())
}

fn validate_tile(tile: &TileMeta) -> Result<(), ManifestError> {
    let bad = |msg: String| Err(ManifestError::Malformed(msg));

    if tile.tile_id.is_empty() {
        return bad("tile with empty tileId".into());
    }
    // Tile IDs become cache file names; restrict to a path-safe charset.
    if !tile
        .tile_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        || tile.tile_id.starts_with('.')
    {
        return bad(format!("tile id {:?} is not path-safe", tile.tile_id));
    }
    if tile.checksum.len() != 64 || !tile.checksum.chars().all(|c| c.is_ascii_hexdigit()) {
        return bad(format!("tile {} has a non-sha256 checksum", tile.tile_id));
    }

    let [min_lon, min_lat, max_lon, max_lat] = tile.bbox;
    let lon_ok = (-180.0..=180.0).contains(&min_lon) && (-180.0..=180.0).contains(&max_lon);
    let lat_ok = (-90.0..=90.0).contains(&min_lat) && (-90.0..=90.0).contains(&max_lat);
    if !lon_ok || !lat_ok || min_lon >= max_lon || min_lat >= max_lat {
        return bad(format!("tile {} has a degenerate bbox", tile.tile_id));
    }
    let [clon, clat] = tile.centroid;
    if !(-180.0..=180.0).contains(&clon) || !(-90.0..=90.0).contains(&clat) {
        return bad(format!("tile {} centroid out of range", tile.tile_id));
    }
    Ok(())
}

/// Bytes the detached signature covers: the manifest object minus its
/// `signature` member, serialized with sorted keys.
pub fn canonical_body(manifest: &TileManifest) -> Vec<u8> {
    let mut value =
        serde_json::to_value(manifest).expect("manifest serialization cannot fail");
    if let Some(obj) = value.as_object_mut() {
        obj.remove("signature");
    }
    // serde_json's default map keeps keys sorted, so this is canonical.
    serde_json::to_vec(&value).expect("value serialization cannot fail")
}

/// How much trust verification established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestTrust {
    /// Signature checked out against the configured public key.
    Verified,
    /// Accepted without a signature check (development policy only).
    Unverified,
}

/// Signature acceptance policy. `Require` is the production default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePolicy {
    Require,
    AllowUnverified,
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        SignaturePolicy::Require
    }
}

/// Verifies manifest signatures against a known publisher key.
#[derive(Clone, Debug)]
pub struct ManifestVerifier {
    policy: SignaturePolicy,
    public_key: Option<VerifyingKey>,
}

impl ManifestVerifier {
    pub fn new(policy: SignaturePolicy, public_key: Option<VerifyingKey>) -> Self {
        Self { policy, public_key }
    }

    /// Strict verifier from a 32-byte hex public key.
    pub fn strict_from_hex(public_key_hex: &str) -> Result<Self, ManifestError> {
        let bytes: [u8; 32] = hex::decode(public_key_hex)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| ManifestError::Malformed("public key must be 32 bytes hex".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ManifestError::Malformed(format!("bad public key: {e}")))?;
        Ok(Self::new(SignaturePolicy::Require, Some(key)))
    }

    /// Development verifier that accepts unsigned manifests.
    pub fn permissive() -> Self {
        Self::new(SignaturePolicy::AllowUnverified, None)
    }

    /// Verify `manifest` at `now`, enforcing expiry and the signature policy.
    pub fn verify_at(
        &self,
        manifest: &TileManifest,
        now: DateTime<Utc>,
    ) -> Result<ManifestTrust, ManifestError> {
        if let Some(until) = manifest.valid_until {
            if now > until {
                return Err(ManifestError::Expired(until));
            }
        }

        let (sig_hex, key) = match (&manifest.signature, &self.public_key) {
            (Some(sig), Some(key)) => (sig, key),
            _ => {
                return match self.policy {
                    SignaturePolicy::Require => {
                        tracing::warn!("rejecting manifest without verifiable signature");
                        Err(ManifestError::SignatureMissing)
                    }
                    SignaturePolicy::AllowUnverified => {
                        tracing::warn!("accepting UNVERIFIED manifest (development policy)");
                        Ok(ManifestTrust::Unverified)
                    }
                };
            }
        };

        let sig_bytes: [u8; 64] = hex::decode(sig_hex)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(ManifestError::SignatureInvalid)?;
        let signature = Signature::from_bytes(&sig_bytes);

        let digest = Sha256::digest(canonical_body(manifest));
        key.verify(digest.as_slice(), &signature)
            .map_err(|_| ManifestError::SignatureInvalid)?;
        Ok(ManifestTrust::Verified)
    }

    /// Verify against the current wall clock.
    pub fn verify(&self, manifest: &TileManifest) -> Result<ManifestTrust, ManifestError> {
        self.verify_at(manifest, Utc::now())
    }
}

/// Sign a manifest body, returning the hex signature. Publisher-side tooling
/// and test fixtures; the prediction path only ever verifies.
pub fn sign(manifest: &TileManifest, signing_key: &ed25519_dalek::SigningKey) -> String {
    use ed25519_dalek::Signer;
    let digest = Sha256::digest(canonical_body(manifest));
    hex::encode(signing_key.sign(digest.as_slice()).to_bytes())
}
