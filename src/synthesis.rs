//! # Harmonic Synthesizer
//!
//! Superposition of tidal constituents into a predicted water level:
//!
//! ```text
//! level(t) = baseline + Σᵢ Aᵢ · f(t) · cos(ωᵢ·h(t) + φᵢ)
//! ```
//!
//! where `h(t)` is hours since the year-2000 epoch, `ωᵢ` the constituent
//! speed in degrees per hour, `φᵢ` the phase lag in degrees, and `f(t)` the
//! combined nodal amplitude factor. Angles stay in degrees until the single
//! radian conversion inside the cosine; anchoring phases to a fixed epoch
//! keeps the arithmetic stable across decades of prediction range.
//!
//! Two deliberate degraded-but-available behaviors, neither an error:
//! - an **empty constituent set** synthesizes one equilibrium semidiurnal
//!   term instead of failing;
//! - output is **clamped** to half a meter beyond the known regional
//!   extremes, so a corrupted amplitude produces a pinned curve, not
//!   absurd numbers.

use chrono::{DateTime, TimeZone, Utc};

use crate::constituents::{Constituent, M2_SPEED};
use crate::nodal::NodalCorrection;

/// Phase/epoch reference: 2000-01-01T00:00:00Z.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .expect("synthesis epoch is a valid instant")
}

/// Hours elapsed between the synthesis epoch and `instant` (negative before
/// the epoch).
pub fn hours_since_epoch(instant: DateTime<Utc>) -> f64 {
    (instant - epoch()).num_milliseconds() as f64 / 3_600_000.0
}

/// Amplitude of the synthetic equilibrium term used when a location has no
/// constituents at all, meters.
pub const EQUILIBRIUM_AMPLITUDE_M: f64 = 0.5;

/// Clamp margin beyond the known extremes, meters.
const CLAMP_MARGIN_M: f64 = 0.5;

/// Stateless harmonic synthesizer for one location.
///
/// Holds the location's mean level and, when a tile supplies them, the known
/// high/low extremes used for output clamping. Constituents are passed per
/// call so the same synthesizer can serve many windows. Safe to share across
/// threads.
#[derive(Clone, Copy, Debug)]
pub struct Synthesizer {
    /// Mean water level above the working datum, meters.
    pub baseline_m: f64,
    /// Known regional low/high water, meters. When absent the clamp derives
    /// its bounds from the constituent envelope of each call.
    pub known_extremes_m: Option<(f64, f64)>,
}

impl Synthesizer {
    pub fn new(baseline_m: f64) -> Self {
        Self {
            baseline_m,
            known_extremes_m: None,
        }
    }

    /// Attach observed low/high water bounds (e.g. from tile statistics).
    pub fn with_known_extremes(mut self, low_m: f64, high_m: f64) -> Self {
        if low_m.is_finite() && high_m.is_finite() && low_m <= high_m {
            self.known_extremes_m = Some((low_m, high_m));
        }
        self
    }

    /// Predict the water level at `instant`, meters above the datum.
    ///
    /// Never fails for in-domain inputs: an empty constituent set falls back
    /// to the equilibrium approximation, and the result is clamped to
    /// `[low − 0.5, high + 0.5]` around the known (or envelope-derived)
    /// extremes.
    pub fn predict(
        &self,
        constituents: &[Constituent],
        nodal: NodalCorrection,
        instant: DateTime<Utc>,
    ) -> f64 {
        let hours = hours_since_epoch(instant);
        let factor = nodal.amplitude_factor();

        let (sum, span) = if constituents.is_empty() {
            let level = EQUILIBRIUM_AMPLITUDE_M * factor * (M2_SPEED * hours).to_radians().cos();
            (level, EQUILIBRIUM_AMPLITUDE_M * factor)
        } else {
            let mut sum = 0.0;
            let mut span = 0.0;
            for c in constituents {
                let angle_deg = c.speed_deg_per_hr * hours + c.phase_deg;
                sum += c.amplitude_m * factor * angle_deg.to_radians().cos();
                span += c.amplitude_m.abs() * factor;
            }
            (sum, span)
        };

        let (low, high) = self
            .known_extremes_m
            .unwrap_or((self.baseline_m - span, self.baseline_m + span));

        let level = self.baseline_m + sum;
        if !level.is_finite() {
            return self.baseline_m;
        }
        level.clamp(low - CLAMP_MARGIN_M, high + CLAMP_MARGIN_M)
    }

    /// Whether a call with these constituents runs in equilibrium mode.
    pub fn is_equilibrium(constituents: &[Constituent]) -> bool {
        constituents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn m2(amplitude_m: f64, phase_deg: f64) -> Constituent {
        Constituent::new("M2", amplitude_m, phase_deg, 28.9841)
    }

    #[test]
    fn example_scenario_from_gulf_of_maine() {
        // amplitude 0.25 m, phase 180°, at the epoch with unit nodal factor:
        // 1.10 + 0.25·cos(180°) = 0.85.
        let synth = Synthesizer::new(1.10);
        let level = synth.predict(&[m2(0.25, 180.0)], NodalCorrection::NONE, epoch());
        assert!((level - 0.85).abs() < 1e-12, "got {level}");
    }

    #[test]
    fn prediction_is_bit_for_bit_deterministic() {
        let synth = Synthesizer::new(1.10);
        let set = vec![m2(0.25, 180.0), Constituent::new("S2", 0.1, 42.0, 30.0)];
        let t = epoch() + Duration::hours(100) + Duration::minutes(7);
        let nodal = crate::nodal::factors_for(t);
        let a = synth.predict(&set, nodal, t);
        let b = synth.predict(&set, nodal, t);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn zero_amplitude_returns_exact_baseline() {
        let synth = Synthesizer::new(2.34);
        for h in [0i64, 13, 997, -450] {
            let t = epoch() + Duration::hours(h);
            let level = synth.predict(&[m2(0.0, 77.0)], NodalCorrection::NONE, t);
            assert_eq!(level, 2.34);
        }
    }

    #[test]
    fn empty_set_runs_equilibrium_mode() {
        let synth = Synthesizer::new(1.0);
        let at_epoch = synth.predict(&[], NodalCorrection::NONE, epoch());
        // cos(0) = 1 at the epoch.
        assert!((at_epoch - (1.0 + EQUILIBRIUM_AMPLITUDE_M)).abs() < 1e-12);
        assert!(Synthesizer::is_equilibrium(&[]));
    }

    #[test]
    fn corrupt_amplitude_is_pinned_to_known_extremes() {
        // Known low/high water of 0.0..3.0 m; a corrupted million-meter
        // amplitude must pin at 3.5 m, not explode.
        let synth = Synthesizer::new(1.5).with_known_extremes(0.0, 3.0);
        let level = synth.predict(&[m2(1.0e6, 0.0)], NodalCorrection::NONE, epoch());
        assert_eq!(level, 3.5);
    }

    #[test]
    fn inverted_known_extremes_are_ignored() {
        let synth = Synthesizer::new(1.5).with_known_extremes(3.0, 0.0);
        assert!(synth.known_extremes_m.is_none());
    }
}
