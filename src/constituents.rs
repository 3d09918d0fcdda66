//! # Tidal Constituent Catalog
//!
//! Static table of the named harmonic constituents the synthesizer understands,
//! plus per-macro-region default amplitude/phase sets used when no calibrated
//! tile is available for a location.
//!
//! A constituent's *speed* (degrees per hour) is an astronomical constant: M2
//! runs at 28.9841042°/h everywhere on Earth. Amplitude and phase are what a
//! tile calibrates per location; the regional defaults here are deliberately
//! coarse — good enough for a "no tile cached yet" first render, clearly worse
//! than any real tile.

use serde::{Deserialize, Serialize};

/// A single sinusoidal component of the tide.
///
/// Immutable once resolved for a location. Amplitude and phase come from a
/// tile (or a regional default); speed always comes from [`speed_of`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    /// Darwin symbol, e.g. "M2", "S2", "K1".
    pub code: String,
    /// Amplitude in meters.
    pub amplitude_m: f64,
    /// Phase lag in degrees relative to the year-2000 epoch.
    pub phase_deg: f64,
    /// Angular speed in degrees per hour.
    pub speed_deg_per_hr: f64,
}

impl Constituent {
    pub fn new(code: &str, amplitude_m: f64, phase_deg: f64, speed_deg_per_hr: f64) -> Self {
        Self {
            code: code.to_string(),
            amplitude_m,
            phase_deg,
            speed_deg_per_hr,
        }
    }
}

/// Speed of the principal lunar semidiurnal constituent (deg/hr).
pub const M2_SPEED: f64 = 28.984_104_2;

/// Known constituent speeds in degrees per hour (Schureman / IHO values).
///
/// Ordered roughly by typical energy so the linear lookup hits the common
/// codes first.
const SPEEDS: &[(&str, f64)] = &[
    ("M2", M2_SPEED),
    ("S2", 30.000_000_0),
    ("N2", 28.439_729_5),
    ("K2", 30.082_137_3),
    ("K1", 15.041_068_6),
    ("O1", 13.943_035_6),
    ("P1", 14.958_931_4),
    ("Q1", 13.398_660_9),
    ("NU2", 28.512_583_1),
    ("MU2", 27.968_208_4),
    ("2N2", 27.895_354_8),
    ("L2", 29.528_478_9),
    ("T2", 29.958_933_3),
    ("J1", 15.585_443_3),
    ("M1", 14.496_693_9),
    ("OO1", 16.139_101_7),
    ("M4", 57.968_208_4),
    ("M6", 86.952_312_7),
    ("MS4", 58.984_104_2),
    ("S4", 60.000_000_0),
    ("MF", 1.098_033_1),
    ("MM", 0.544_374_7),
    ("SSA", 0.082_137_3),
    ("SA", 0.041_068_6),
];

/// Look up the astronomical speed of a constituent by Darwin symbol.
///
/// Case-insensitive. Returns `None` for codes the catalog does not carry;
/// callers decide whether to drop the constituent or fail the payload.
pub fn speed_of(code: &str) -> Option<f64> {
    SPEEDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(code))
        .map(|(_, speed)| *speed)
}

/// Coarse macro-regions used to pick a default constituent set when a
/// location has no calibrated tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    NorthAtlantic,
    NorthPacific,
    GulfOfMexico,
    EuropeanShelf,
    /// Anywhere the other regions don't cover; mild semidiurnal defaults.
    Open,
}

impl Region {
    /// Classify a coordinate into a macro-region.
    ///
    /// Boxes are intentionally crude — this only feeds the degraded
    /// "no tile" path, never a calibrated prediction.
    pub fn classify(lat: f64, lon: f64) -> Self {
        if (18.0..=31.0).contains(&lat) && (-98.0..=-80.0).contains(&lon) {
            Region::GulfOfMexico
        } else if (43.0..=62.0).contains(&lat) && (-12.0..=12.0).contains(&lon) {
            Region::EuropeanShelf
        } else if (5.0..=70.0).contains(&lat) && (-100.0..=-5.0).contains(&lon) {
            Region::NorthAtlantic
        } else if (5.0..=65.0).contains(&lat) && !(-100.0..=20.0).contains(&lon) {
            Region::NorthPacific
        } else {
            Region::Open
        }
    }

    /// Mean water level above the working datum for this region, meters.
    pub fn baseline_m(self) -> f64 {
        match self {
            Region::NorthAtlantic => 1.50,
            Region::NorthPacific => 1.20,
            Region::GulfOfMexico => 0.40,
            Region::EuropeanShelf => 2.60,
            Region::Open => 1.00,
        }
    }

    /// Default constituents for the region.
    ///
    /// Amplitudes/phases are representative open-coast values (the North
    /// Atlantic set tracks the Gulf of Maine harmonics the project started
    /// from); speeds come from the catalog.
    pub fn default_constituents(self) -> Vec<Constituent> {
        let set: &[(&str, f64, f64)] = match self {
            Region::NorthAtlantic => &[
                ("M2", 1.37, 102.0),
                ("S2", 0.21, 136.0),
                ("N2", 0.31, 72.0),
                ("K1", 0.14, 181.0),
                ("O1", 0.11, 202.0),
            ],
            Region::NorthPacific => &[
                ("M2", 0.55, 290.0),
                ("S2", 0.15, 312.0),
                ("K1", 0.40, 95.0),
                ("O1", 0.25, 80.0),
            ],
            Region::GulfOfMexico => &[
                ("K1", 0.16, 15.0),
                ("O1", 0.16, 10.0),
                ("M2", 0.05, 120.0),
            ],
            Region::EuropeanShelf => &[
                ("M2", 1.80, 320.0),
                ("S2", 0.60, 5.0),
                ("N2", 0.35, 300.0),
                ("K2", 0.17, 3.0),
                ("K1", 0.07, 160.0),
            ],
            Region::Open => &[("M2", 0.50, 0.0), ("S2", 0.15, 30.0), ("K1", 0.10, 60.0)],
        };
        set.iter()
            .map(|(code, amp, phase)| {
                Constituent::new(code, *amp, *phase, speed_of(code).unwrap_or(M2_SPEED))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_lookup_is_case_insensitive() {
        assert_eq!(speed_of("m2"), Some(M2_SPEED));
        assert_eq!(speed_of("M2"), Some(M2_SPEED));
        assert_eq!(speed_of("Ssa"), Some(0.082_137_3));
        assert_eq!(speed_of("ZZ9"), None);
    }

    #[test]
    fn every_region_has_a_semidiurnal_or_diurnal_term() {
        for region in [
            Region::NorthAtlantic,
            Region::NorthPacific,
            Region::GulfOfMexico,
            Region::EuropeanShelf,
            Region::Open,
        ] {
            let set = region.default_constituents();
            assert!(!set.is_empty());
            assert!(set
                .iter()
                .all(|c| c.amplitude_m > 0.0 && c.speed_deg_per_hr > 0.0));
        }
    }

    #[test]
    fn classify_known_coastlines() {
        assert_eq!(Region::classify(43.66, -70.25), Region::NorthAtlantic); // Portland, ME
        assert_eq!(Region::classify(48.38, -4.50), Region::EuropeanShelf); // Brest
        assert_eq!(Region::classify(29.3, -94.8), Region::GulfOfMexico); // Galveston
        assert_eq!(Region::classify(47.6, -122.3), Region::NorthPacific); // Seattle
        assert_eq!(Region::classify(-40.0, 150.0), Region::Open);
    }
}
