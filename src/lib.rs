//! # Tidecast Core Library
//!
//! Offline-first tide prediction: harmonic synthesis over tidal constituents,
//! fed by versioned "tiles" of per-location parameters that are cached on
//! device and evicted under quota pressure. Built for clients with
//! intermittent or slow connectivity — once a tile is cached, every
//! prediction is a purely local computation.
//!
//! ## Architecture
//!
//! Leaf-first, each layer depending only on the ones before it:
//!
//! 1. [`constituents`] — constituent speed catalog and regional defaults
//! 2. [`nodal`] — slowly-varying astronomical amplitude corrections
//! 3. [`synthesis`] — harmonic superposition into a predicted level
//! 4. [`extrema`] — high/low water detection with confidence scoring
//! 5. [`manifest`] — signed tile index: parsing, validation, verification
//! 6. [`selector`] — geographic tile selection for a coordinate
//! 7. [`tile`] — compressed payload encode/decode and calibration merge
//! 8. [`cache`] — persistent, checksum-verified, quota-bounded tile store
//! 9. [`predictor`] — the orchestrator tying cache, payload and engines
//!    together
//!
//! ## Degradation over failure
//!
//! The numeric path never throws for in-domain inputs. No tile? Regional
//! defaults. No constituents? Equilibrium approximation. Corrupt cache
//! entry? Self-healing miss. Every degradation is visible in the result's
//! `source` and `flags` fields, and none of them takes the process down.
//!
//! ## Concurrency
//!
//! Synthesis, nodal correction, and extrema detection are pure and
//! stateless — call them from any thread. The tile cache is the only
//! stateful component; it serializes mutations behind a mutex and keeps
//! eviction atomic with the quota check that triggered it.

pub mod cache;
pub mod config;
pub mod constituents;
pub mod extrema;
pub mod manifest;
pub mod nodal;
pub mod predictor;
pub mod selector;
pub mod synthesis;
pub mod tile;

pub use cache::{CacheLimits, CacheStats, CachedTileRecord, TileCache};
pub use constituents::{Constituent, Region};
pub use extrema::{EventKind, TideEvent};
pub use manifest::{ManifestVerifier, SignaturePolicy, TileManifest, TileMeta};
pub use predictor::{
    PredictError, PredictionPoint, PredictionRequest, PredictionResult, Predictor, Source,
    TideEngine, Unit,
};
pub use selector::Coordinate;
pub use synthesis::Synthesizer;
pub use tile::TilePayload;
