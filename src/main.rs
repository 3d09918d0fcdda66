//! # Tidecast Application Entry Point
//!
//! Development/diagnostic front end for the prediction library: loads the
//! configuration and the locally stored manifest, selects the tile for a
//! coordinate, and prints a 24-hour prediction table plus high/low events to
//! stdout. If the selected tile is not cached it falls back to regional
//! defaults and says so — the binary never performs network I/O.

use std::env;
use std::fs;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;

use tidecast::config::Config;
use tidecast::manifest::{self, ManifestVerifier, SignaturePolicy};
use tidecast::predictor::{PredictError, PredictionRequest, Predictor};
use tidecast::selector::{self, Coordinate};
use tidecast::{Region, TileCache};

fn arg_value(name: &str) -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load();

    let lat: f64 = arg_value("--lat")
        .context("--lat <degrees> is required")?
        .parse()
        .context("--lat must be a number")?;
    let lon: f64 = arg_value("--lon")
        .context("--lon <degrees> is required")?
        .parse()
        .context("--lon must be a number")?;
    let coord = Coordinate::new(lat, lon);

    let cache = Arc::new(TileCache::open(&config.cache.dir, config.cache_limits())?);
    let predictor = Predictor::new(Arc::clone(&cache));

    // Resolve the tile for the coordinate from the stored manifest, if any.
    let tile_id = match fs::read_to_string(&config.manifest.path) {
        Ok(raw) => {
            let parsed = manifest::parse(&raw)?;
            let verifier = match config.manifest.signature_policy {
                SignaturePolicy::Require => {
                    ManifestVerifier::strict_from_hex(&config.manifest.public_key_hex)
                        .context("strict policy needs manifest.public_key_hex in tidecast.toml")?
                }
                SignaturePolicy::AllowUnverified => ManifestVerifier::permissive(),
            };
            verifier.verify(&parsed)?;
            selector::select(&parsed, coord).map(|t| t.tile_id.clone())
        }
        Err(_) => {
            eprintln!("no manifest at {}; using regional defaults", config.manifest.path);
            None
        }
    };

    let now = Utc::now();
    let request = PredictionRequest {
        tile_id: tile_id.clone().unwrap_or_else(|| "regional".into()),
        start_time_utc: now,
        end_time_utc: now + Duration::hours(24),
        step_minutes: config.prediction.step_minutes,
        datum: None,
        unit: config.prediction.unit,
        include_confidence: false,
        include_slope: true,
    };

    let (result, used_tile) = match &tile_id {
        Some(_) => match predictor.predict(&request) {
            Ok(result) => (result, true),
            Err(PredictError::TileNotCached(id)) => {
                eprintln!("tile {id} not cached; falling back to regional defaults");
                let fallback = predictor.predict_from_region(Region::classify(lat, lon), &request)?;
                (fallback, false)
            }
            Err(e) => return Err(e.into()),
        },
        None => (
            predictor.predict_from_region(Region::classify(lat, lon), &request)?,
            false,
        ),
    };

    println!(
        "tide prediction for ({lat:.4}, {lon:.4})  tile={}  source={:?}  flags={:?}",
        result.tile_id, result.source, result.flags
    );
    for point in &result.points {
        let trend = match point.slope_per_minute {
            Some(s) if s > 1e-6 => "rising",
            Some(s) if s < -1e-6 => "falling",
            _ => "slack",
        };
        println!(
            "  {}  {:6.2} {:?}  {}",
            point.timestamp_utc.format("%Y-%m-%d %H:%M"),
            point.level,
            result.unit,
            trend
        );
    }

    if used_tile {
        let events = predictor.find_extremes(&request)?;
        println!("high/low events:");
        for event in &events.events {
            println!(
                "  {}  {:6.2} m  {:?}  ({:.0}% confidence)",
                event.timestamp_utc.format("%Y-%m-%d %H:%M"),
                event.level_m,
                event.kind,
                event.confidence_pct
            );
        }
    }

    let stats = cache.stats();
    eprintln!(
        "cache: {} tiles, {} bytes",
        stats.count, stats.total_bytes
    );
    Ok(())
}
