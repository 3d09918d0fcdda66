//! Nodal (astronomical) corrections for harmonic synthesis.
//!
//! Constituent amplitudes breathe slowly with the Moon's 18.61-year nodal
//! regression, its 8.85-year perigee cycle, and the orbital inclination term.
//! This module reduces those to three per-instant scalar factors applied
//! multiplicatively to every constituent amplitude before synthesis.
//!
//! Low precision on purpose: the cycle arguments are linear fits against the
//! J2000 epoch (same approach as the Schaefer lunar routines this project
//! descends from), which holds to a fraction of a percent across 1900–2100.
//! Outside that window the factors ease back to 1.0 — an uncorrected
//! prediction is still a usable prediction, a wild extrapolation is not.

use chrono::{DateTime, TimeZone, Utc};

/// Per-instant multiplicative amplitude factors. Pure function of time,
/// no persisted state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodalCorrection {
    /// 18.61-year lunar node regression factor.
    pub node: f64,
    /// 8.85-year perigee cycle factor.
    pub perigee: f64,
    /// Orbital inclination factor.
    pub inclination: f64,
}

impl NodalCorrection {
    /// Identity correction (all factors 1.0).
    pub const NONE: NodalCorrection = NodalCorrection {
        node: 1.0,
        perigee: 1.0,
        inclination: 1.0,
    };

    /// Combined scalar applied to constituent amplitudes.
    pub fn amplitude_factor(&self) -> f64 {
        self.node * self.perigee * self.inclination
    }
}

/// Years around which the linear cycle fits are trustworthy.
const VALID_FROM_YEAR: i32 = 1900;
const VALID_UNTIL_YEAR: i32 = 2100;

/// Days from the J2000.0 epoch (2000-01-01 12:00 UT) to `instant`.
fn days_since_j2000(instant: DateTime<Utc>) -> f64 {
    let j2000 = Utc
        .with_ymd_and_hms(2000, 1, 1, 12, 0, 0)
        .single()
        .expect("J2000 epoch is a valid instant");
    (instant - j2000).num_seconds() as f64 / 86_400.0
}

/// Compute the nodal correction factors for `instant`.
///
/// Always returns a value. For instants outside the comfortably-valid
/// 1900–2100 window the factors degrade to exactly 1.0 (no correction)
/// rather than extrapolating the linear fits.
pub fn factors_for(instant: DateTime<Utc>) -> NodalCorrection {
    use chrono::Datelike;
    let year = instant.year();
    if !(VALID_FROM_YEAR..=VALID_UNTIL_YEAR).contains(&year) {
        return NodalCorrection::NONE;
    }

    let d = days_since_j2000(instant);

    // Longitude of the Moon's ascending node, degrees (Meeus linear term).
    let n = (125.044_52 - 0.052_953_77 * d).rem_euclid(360.0).to_radians();
    // Mean longitude of lunar perigee, degrees.
    let p = (83.353_246_5 + 0.111_403_53 * d).rem_euclid(360.0).to_radians();

    // Semidiurnal-band nodal factor (Schureman f(M2) ≈ 1.000 − 0.037 cos N).
    let node = 1.0 - 0.037 * n.cos();
    // Perigean modulation, small and symmetric around 1.
    let perigee = 1.0 + 0.010 * p.cos();
    // Inclination term rides on the node cycle at double the argument.
    let inclination = 1.0 + 0.004 * (2.0 * n).cos();

    NodalCorrection {
        node,
        perigee,
        inclination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn factors_are_deterministic() {
        let t = Utc.with_ymd_and_hms(2026, 8, 27, 12, 0, 0).unwrap();
        let a = factors_for(t);
        let b = factors_for(t);
        assert_eq!(a, b);
    }

    #[test]
    fn factors_stay_near_unity_in_valid_window() {
        for year in (1900..=2100).step_by(10) {
            let t = Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap();
            let f = factors_for(t).amplitude_factor();
            assert!(
                (0.90..=1.10).contains(&f),
                "amplitude factor {f} out of band for {year}"
            );
        }
    }

    #[test]
    fn degrades_to_identity_outside_window() {
        let ancient = Utc.with_ymd_and_hms(1490, 1, 1, 0, 0, 0).unwrap();
        let far = Utc.with_ymd_and_hms(2500, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(factors_for(ancient), NodalCorrection::NONE);
        assert_eq!(factors_for(far), NodalCorrection::NONE);
    }

    #[test]
    fn node_cycle_period_is_about_18_6_years() {
        // The node factor should come back to (nearly) itself one nodal
        // period later.
        let t0 = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::days((18.613 * 365.25) as i64);
        let f0 = factors_for(t0);
        let f1 = factors_for(t1);
        assert!((f0.node - f1.node).abs() < 0.005);
    }
}
