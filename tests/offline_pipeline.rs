//! End-to-end exercise of the offline prediction pipeline: a signed manifest
//! is validated and verified, a tile is selected for a coordinate, its
//! payload lands in the cache, and the orchestrator answers prediction and
//! extrema requests from local state only.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use tidecast::cache::CacheLimits;
use tidecast::manifest::{self, ManifestVerifier, SignaturePolicy, TileManifest, TileMeta};
use tidecast::predictor::{PredictionRequest, Predictor, Source, Unit};
use tidecast::selector::{self, Coordinate};
use tidecast::tile::{PayloadConstituent, TilePayload, TileStats};
use tidecast::TileCache;

fn gulf_of_maine_payload() -> TilePayload {
    TilePayload {
        tile_id: "gulf-of-maine-01".into(),
        constituents: vec![
            PayloadConstituent {
                name: "M2".into(),
                amplitude: 1.37,
                phase: 102.0,
                speed_deg_hr: None,
            },
            PayloadConstituent {
                name: "S2".into(),
                amplitude: 0.21,
                phase: 136.0,
                speed_deg_hr: None,
            },
            PayloadConstituent {
                name: "N2".into(),
                amplitude: 0.31,
                phase: 72.0,
                speed_deg_hr: None,
            },
        ],
        minor_rules: None,
        local_calibration: None,
        datum_transforms: Some(HashMap::from([("MLLW".into(), 1.43)])),
        stats: Some(TileStats {
            mean_level: Some(1.50),
            min_level: Some(-0.6),
            max_level: Some(3.6),
        }),
    }
}

fn signed_manifest(payload: &TilePayload, key: &SigningKey) -> TileManifest {
    let blob = payload.encode().unwrap();
    let mut manifest = TileManifest {
        version: 1,
        issued_at: Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
        valid_until: None,
        ephemerides_ref: "de440s".into(),
        tiles: vec![TileMeta {
            tile_id: payload.tile_id.clone(),
            model: "fes2014".into(),
            datum: "MSL".into(),
            bbox: [-71.0, 42.0, -69.0, 44.5],
            centroid: [-70.0, 43.25],
            timezone_hint: Some("America/New_York".into()),
            updated_at: Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap(),
            version: 1,
            checksum: payload.checksum().unwrap(),
            compressed_size_bytes: blob.len() as u64,
        }],
        signature: None,
    };
    manifest.signature = Some(manifest::sign(&manifest, key));
    manifest
}

#[test]
fn manifest_to_prediction_round_trip() {
    let key = SigningKey::from_bytes(&[42u8; 32]);
    let payload = gulf_of_maine_payload();
    let manifest = signed_manifest(&payload, &key);

    // Re-parse from raw JSON, the way a downloaded manifest arrives.
    let raw = serde_json::to_string(&manifest).unwrap();
    let parsed = manifest::parse(&raw).unwrap();

    let verifier = ManifestVerifier::new(SignaturePolicy::Require, Some(key.verifying_key()));
    verifier.verify(&parsed).unwrap();

    // Portland, ME falls inside the tile's bbox.
    let coord = Coordinate::new(43.66, -70.25);
    let tile = selector::select(&parsed, coord).expect("manifest has a tile");
    assert_eq!(tile.tile_id, "gulf-of-maine-01");

    // Simulate the download: verify against the manifest checksum, cache it.
    let blob = payload.encode().unwrap();
    TilePayload::decode_verified(&blob, &tile.checksum).unwrap();

    let dir = TempDir::new().unwrap();
    let cache = Arc::new(TileCache::open(dir.path(), CacheLimits::default()).unwrap());
    cache.put(&tile.tile_id, tile.version, &blob).unwrap();

    // Predict two days at 15-minute resolution, purely offline.
    let predictor = Predictor::new(Arc::clone(&cache));
    let start = Utc.with_ymd_and_hms(2026, 8, 27, 0, 0, 0).unwrap();
    let request = PredictionRequest {
        tile_id: tile.tile_id.clone(),
        start_time_utc: start,
        end_time_utc: start + Duration::hours(48),
        step_minutes: 15,
        datum: None,
        unit: Unit::M,
        include_confidence: true,
        include_slope: true,
    };

    let result = predictor.predict(&request).unwrap();
    assert_eq!(result.source, Source::Fallback);
    assert!(result.flags.is_empty());
    assert_eq!(result.points.len(), 48 * 4 + 1);

    // Levels must stay inside the tile's clamp envelope.
    for p in &result.points {
        assert!((-1.1..=4.1).contains(&p.level), "level {} escaped", p.level);
        assert!(p.lower_bound.unwrap() < p.level && p.level < p.upper_bound.unwrap());
    }

    // A semidiurnal regime turns roughly four times a day.
    let events = predictor.find_extremes(&request).unwrap();
    assert!(
        (6..=10).contains(&events.events.len()),
        "expected ~8 events over 48h, got {}",
        events.events.len()
    );
    for pair in events.events.windows(2) {
        assert_ne!(pair[0].kind, pair[1].kind);
    }
    for event in &events.events {
        assert!(event.confidence_pct > 0.0 && event.confidence_pct <= 95.0);
    }

    // The cache saw the tile twice (prediction + extremes).
    let record = cache.get(&tile.tile_id).unwrap().unwrap().record;
    assert_eq!(record.access_count, 3);
}

#[test]
fn tampered_payload_heals_and_surfaces_as_not_cached() {
    let payload = gulf_of_maine_payload();
    let blob = payload.encode().unwrap();

    let dir = TempDir::new().unwrap();
    let cache = Arc::new(TileCache::open(dir.path(), CacheLimits::default()).unwrap());
    cache.put("gulf-of-maine-01", 1, &blob).unwrap();

    // Flip bytes in the stored blob.
    let blob_path = dir.path().join("gulf-of-maine-01.tile");
    let mut bytes = std::fs::read(&blob_path).unwrap();
    for b in bytes.iter_mut().take(16) {
        *b ^= 0xFF;
    }
    std::fs::write(&blob_path, bytes).unwrap();

    let predictor = Predictor::new(Arc::clone(&cache));
    let start = Utc.with_ymd_and_hms(2026, 8, 27, 0, 0, 0).unwrap();
    let request = PredictionRequest {
        tile_id: "gulf-of-maine-01".into(),
        start_time_utc: start,
        end_time_utc: start + Duration::hours(6),
        step_minutes: 30,
        datum: None,
        unit: Unit::M,
        include_confidence: false,
        include_slope: false,
    };

    // Checksum validation turns the corruption into a clean miss...
    let err = predictor.predict(&request).unwrap_err();
    assert!(matches!(
        err,
        tidecast::PredictError::TileNotCached(id) if id == "gulf-of-maine-01"
    ));
    // ...and the corrupt entry is gone.
    assert_eq!(cache.stats().count, 0);
}
