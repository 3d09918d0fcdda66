//! # Prediction Orchestrator
//!
//! Answers a prediction request end to end: load the tile from the cache,
//! decode its payload, merge calibration, then drive an ordered chain of
//! engines — an optional injected native engine first, the built-in harmonic
//! synthesizer as the always-available fallback, and the equilibrium
//! approximation when a tile carries no usable constituents at all.
//!
//! Engine failures are silent to the caller except for the `source` field and
//! a flag; structural problems (no cached tile, nonsense time range) are
//! typed errors. The orchestrator performs no network I/O and no partial
//! cache writes: a request that fails or times out upstream leaves the cache
//! exactly as it found it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheError, TileCache};
use crate::constituents::{Constituent, Region};
use crate::extrema::{self, TideEvent};
use crate::nodal;
use crate::synthesis::Synthesizer;
use crate::tile::{PayloadError, TilePayload};

/// Ceiling on points per request; keeps a bad range from allocating wildly.
const MAX_POINTS: i64 = 50_000;

/// Meters per foot.
const FOOT_M: f64 = 0.3048;

/// Fixed part of the uncertainty band, meters.
const BAND_FLOOR_M: f64 = 0.10;
/// Range-proportional part of the uncertainty band.
const BAND_RANGE_FRACTION: f64 = 0.02;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    M,
    Ft,
}

impl Unit {
    fn from_meters(self, meters: f64) -> f64 {
        match self {
            Unit::M => meters,
            Unit::Ft => meters / FOOT_M,
        }
    }
}

/// Which strategy produced the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Native,
    Fallback,
    Equilibrium,
}

/// A prediction request as the orchestration layer hands it down.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub tile_id: String,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub step_minutes: i64,
    /// Vertical datum to express levels against; `None` keeps the tile's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
    pub unit: Unit,
    #[serde(default)]
    pub include_confidence: bool,
    #[serde(default)]
    pub include_slope: bool,
}

/// One predicted sample, in the requested unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPoint {
    pub timestamp_utc: DateTime<Utc>,
    pub level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope_per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
}

/// What downstream consumers see. Degradations ride in `flags`, never as
/// errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub tile_id: String,
    pub points: Vec<PredictionPoint>,
    pub datum: String,
    pub unit: Unit,
    pub source: Source,
    pub generated_at: DateTime<Utc>,
    pub flags: Vec<String>,
}

/// High/low events over a window, with the same degradation reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TideEvents {
    pub tile_id: String,
    pub events: Vec<TideEvent>,
    pub source: Source,
    pub generated_at: DateTime<Utc>,
    pub flags: Vec<String>,
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("tile {0} is not cached; caller must download it first")]
    TileNotCached(String),
    #[error("invalid request range: {0}")]
    InvalidRequestRange(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// A prediction engine failure. Only ever reported through `flags`.
#[derive(Error, Debug)]
#[error("engine error: {0}")]
pub struct EngineError(pub String);

/// Everything an engine needs to synthesize a series.
pub struct EngineContext<'a> {
    pub constituents: &'a [Constituent],
    pub synthesizer: Synthesizer,
}

/// One strategy in the ordered prediction chain.
///
/// Implementations must be pure with respect to the context: same inputs,
/// same outputs, no suspension.
pub trait TideEngine: Send + Sync {
    fn name(&self) -> &'static str;
    /// Predicted levels in meters, one per requested instant.
    fn predict_series(
        &self,
        ctx: &EngineContext<'_>,
        times: &[DateTime<Utc>],
    ) -> Result<Vec<f64>, EngineError>;
}

/// The built-in portable engine: plain harmonic synthesis. Never fails.
struct HarmonicEngine;

impl TideEngine for HarmonicEngine {
    fn name(&self) -> &'static str {
        "harmonic"
    }

    fn predict_series(
        &self,
        ctx: &EngineContext<'_>,
        times: &[DateTime<Utc>],
    ) -> Result<Vec<f64>, EngineError> {
        Ok(times
            .iter()
            .map(|&t| ctx.synthesizer.predict(ctx.constituents, nodal::factors_for(t), t))
            .collect())
    }
}

/// The orchestrator. Owns no network; the cache is its only stateful
/// collaborator, injected at construction.
pub struct Predictor {
    cache: Arc<TileCache>,
    native: Option<Box<dyn TideEngine>>,
}

impl Predictor {
    pub fn new(cache: Arc<TileCache>) -> Self {
        Self {
            cache,
            native: None,
        }
    }

    /// Install a high-performance native engine ahead of the harmonic
    /// fallback. Any failure it reports falls through transparently.
    pub fn with_native_engine(mut self, engine: Box<dyn TideEngine>) -> Self {
        self.native = Some(engine);
        self
    }

    /// Predict a level series for a cached tile.
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, PredictError> {
        let times = sample_times(request)?;
        let loaded = self.load_tile(request)?;
        self.run(request, &times, loaded)
    }

    /// Locate high/low tide events for a cached tile.
    ///
    /// An empty `events` list with a `flat_series` flag is the documented
    /// degraded mode for tiles whose series never turns.
    pub fn find_extremes(
        &self,
        request: &PredictionRequest,
    ) -> Result<TideEvents, PredictError> {
        validate_range(request)?;
        let loaded = self.load_tile(request)?;
        let LoadedTile {
            constituents,
            synthesizer,
            mut flags,
            ..
        } = loaded;

        let events = extrema::find_extremes(
            &synthesizer,
            &constituents,
            request.start_time_utc,
            request.end_time_utc,
            request.step_minutes,
        );

        let source = if constituents.is_empty() {
            Source::Equilibrium
        } else {
            Source::Fallback
        };
        if events.is_empty() && !constituents.is_empty() {
            flags.push("flat_series".into());
        }

        Ok(TideEvents {
            tile_id: request.tile_id.clone(),
            events,
            source,
            generated_at: Utc::now(),
            flags,
        })
    }

    /// Degraded no-tile path: predict from the regional default catalog.
    ///
    /// This is what callers use after `predict` signals
    /// [`PredictError::TileNotCached`] and no download is possible.
    pub fn predict_from_region(
        &self,
        region: Region,
        request: &PredictionRequest,
    ) -> Result<PredictionResult, PredictError> {
        let times = sample_times(request)?;
        let mut loaded = LoadedTile {
            constituents: region.default_constituents(),
            synthesizer: Synthesizer::new(region.baseline_m()),
            datum: "region-default".into(),
            flags: vec!["regional_defaults".into()],
        };
        // Regional defaults carry no datum transforms.
        if request.datum.is_some() {
            loaded.flags.push("unknown_datum".into());
        }
        self.run(request, &times, loaded)
    }

    fn run(
        &self,
        request: &PredictionRequest,
        times: &[DateTime<Utc>],
        loaded: LoadedTile,
    ) -> Result<PredictionResult, PredictError> {
        let LoadedTile {
            constituents,
            synthesizer,
            datum,
            mut flags,
        } = loaded;

        let ctx = EngineContext {
            constituents: &constituents,
            synthesizer,
        };

        let (levels_m, source) = if constituents.is_empty() {
            flags.push("missing_constituents".into());
            let levels = HarmonicEngine
                .predict_series(&ctx, times)
                .expect("harmonic engine is total");
            (levels, Source::Equilibrium)
        } else if let Some(native) = &self.native {
            match native.predict_series(&ctx, times) {
                Ok(levels) if levels.len() == times.len() => (levels, Source::Native),
                Ok(_) => {
                    tracing::warn!(engine = native.name(), "native engine returned wrong length");
                    flags.push("native_engine_failed".into());
                    let levels = HarmonicEngine
                        .predict_series(&ctx, times)
                        .expect("harmonic engine is total");
                    (levels, Source::Fallback)
                }
                Err(e) => {
                    tracing::warn!(engine = native.name(), error = %e, "native engine failed");
                    flags.push("native_engine_failed".into());
                    let levels = HarmonicEngine
                        .predict_series(&ctx, times)
                        .expect("harmonic engine is total");
                    (levels, Source::Fallback)
                }
            }
        } else {
            let levels = HarmonicEngine
                .predict_series(&ctx, times)
                .expect("harmonic engine is total");
            (levels, Source::Fallback)
        };

        let band_m = uncertainty_band_m(&synthesizer, &constituents);
        let step_min = request.step_minutes as f64;
        let unit = request.unit;

        let points = times
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let level_m = levels_m[i];
                let slope_per_minute = request.include_slope.then(|| {
                    // Central difference; one-sided at the window edges.
                    let (a, b, span) = if i == 0 {
                        (levels_m[0], levels_m[1.min(levels_m.len() - 1)], step_min)
                    } else if i == levels_m.len() - 1 {
                        (levels_m[i - 1], levels_m[i], step_min)
                    } else {
                        (levels_m[i - 1], levels_m[i + 1], 2.0 * step_min)
                    };
                    unit.from_meters((b - a) / span.max(1.0))
                });
                let (lower_bound, upper_bound) = if request.include_confidence {
                    (
                        Some(unit.from_meters(level_m - band_m)),
                        Some(unit.from_meters(level_m + band_m)),
                    )
                } else {
                    (None, None)
                };
                PredictionPoint {
                    timestamp_utc: t,
                    level: unit.from_meters(level_m),
                    slope_per_minute,
                    lower_bound,
                    upper_bound,
                }
            })
            .collect();

        Ok(PredictionResult {
            tile_id: request.tile_id.clone(),
            points,
            datum,
            unit,
            source,
            generated_at: Utc::now(),
            flags,
        })
    }

    fn load_tile(&self, request: &PredictionRequest) -> Result<LoadedTile, PredictError> {
        let tile_id = request.tile_id.as_str();
        let cached = self
            .cache
            .get(tile_id)?
            .ok_or_else(|| PredictError::TileNotCached(tile_id.to_string()))?;

        let payload = TilePayload::decode(&cached.compressed_payload)?;
        let resolved = payload.resolve();

        let mut flags = Vec::new();
        for name in &resolved.dropped {
            flags.push(format!("unresolved_speed:{name}"));
        }

        let stats = payload.stats.clone().unwrap_or_default();
        let baseline = stats.mean_level.unwrap_or(0.0);
        let mut synthesizer = Synthesizer::new(baseline);
        if let (Some(low), Some(high)) = (stats.min_level, stats.max_level) {
            synthesizer = synthesizer.with_known_extremes(low, high);
        }

        let mut loaded = LoadedTile {
            constituents: resolved.constituents,
            synthesizer,
            datum: "tile-native".into(),
            flags,
        };
        Self::apply_datum(&mut loaded, &payload, request);
        Ok(loaded)
    }
}

struct LoadedTile {
    constituents: Vec<Constituent>,
    synthesizer: Synthesizer,
    datum: String,
    flags: Vec<String>,
}

impl Predictor {
    /// Apply the request's datum to a loaded tile, adjusting the baseline
    /// when the tile knows the transform and flagging when it does not.
    fn apply_datum(loaded: &mut LoadedTile, payload: &TilePayload, request: &PredictionRequest) {
        if let Some(datum) = &request.datum {
            match payload.datum_offset_m(datum) {
                Some(offset) => {
                    loaded.synthesizer.baseline_m += offset;
                    if let Some((low, high)) = loaded.synthesizer.known_extremes_m {
                        loaded.synthesizer.known_extremes_m = Some((low + offset, high + offset));
                    }
                    loaded.datum = datum.clone();
                }
                None => {
                    loaded.flags.push("unknown_datum".into());
                }
            }
        }
    }
}

fn validate_range(request: &PredictionRequest) -> Result<(), PredictError> {
    if request.step_minutes < 1 {
        return Err(PredictError::InvalidRequestRange(format!(
            "stepMinutes must be >= 1, got {}",
            request.step_minutes
        )));
    }
    if request.end_time_utc <= request.start_time_utc {
        return Err(PredictError::InvalidRequestRange(
            "endTimeUtc must follow startTimeUtc".into(),
        ));
    }
    let points = (request.end_time_utc - request.start_time_utc).num_minutes()
        / request.step_minutes
        + 1;
    if points > MAX_POINTS {
        return Err(PredictError::InvalidRequestRange(format!(
            "range yields {points} points, limit is {MAX_POINTS}"
        )));
    }
    Ok(())
}

fn sample_times(request: &PredictionRequest) -> Result<Vec<DateTime<Utc>>, PredictError> {
    validate_range(request)?;
    let n = (request.end_time_utc - request.start_time_utc).num_minutes()
        / request.step_minutes
        + 1;
    Ok((0..n)
        .map(|i| request.start_time_utc + Duration::minutes(i * request.step_minutes))
        .collect())
}

/// Half-width of the reported confidence band, meters.
fn uncertainty_band_m(synth: &Synthesizer, constituents: &[Constituent]) -> f64 {
    let range = match synth.known_extremes_m {
        Some((low, high)) => high - low,
        None => 2.0 * constituents.iter().map(|c| c.amplitude_m.abs()).sum::<f64>(),
    };
    BAND_FLOOR_M + BAND_RANGE_FRACTION * range
}
