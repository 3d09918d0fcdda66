//! Geographic tile selection.
//!
//! First tile whose bounding box contains the coordinate wins (boxes are
//! non-overlapping by construction upstream, so order never matters in
//! practice). A coordinate outside every box resolves to the tile with the
//! nearest centroid by great-circle distance, so offshore or boundary
//! coordinates still get the best available harmonics.

use serde::{Deserialize, Serialize};

use crate::manifest::{TileManifest, TileMeta};

/// Mean Earth radius, kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geographic query point, degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points, kilometers (haversine).
pub fn great_circle_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Pick the manifest tile for `coord`.
///
/// Containment first (first match wins), then nearest centroid. `None` only
/// when the manifest lists no tiles at all.
pub fn select<'m>(manifest: &'m TileManifest, coord: Coordinate) -> Option<&'m TileMeta> {
    if let Some(tile) = manifest
        .tiles
        .iter()
        .find(|t| t.contains(coord.lon, coord.lat))
    {
        return Some(tile);
    }

    manifest
        .tiles
        .iter()
        .min_by(|a, b| {
            let da = great_circle_km(coord, Coordinate::new(a.centroid[1], a.centroid[0]));
            let db = great_circle_km(coord, Coordinate::new(b.centroid[1], b.centroid[0]));
            da.total_cmp(&db)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tile(id: &str, bbox: [f64; 4]) -> TileMeta {
        TileMeta {
            tile_id: id.into(),
            model: "fes2014".into(),
            datum: "MSL".into(),
            bbox,
            centroid: [(bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0],
            timezone_hint: None,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            version: 1,
            checksum: "00".repeat(32),
            compressed_size_bytes: 100,
        }
    }

    fn manifest(tiles: Vec<TileMeta>) -> TileManifest {
        TileManifest {
            version: 1,
            issued_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            valid_until: None,
            ephemerides_ref: "de440s".into(),
            tiles,
            signature: None,
        }
    }

    #[test]
    fn containment_beats_centroid_proximity() {
        // The point sits just inside the big tile but far from its centroid,
        // and very close to the small tile's centroid. Containment must win.
        let big = tile("big", [-80.0, 30.0, -60.0, 50.0]);
        let near = tile("near", [-59.9, 30.0, -59.0, 31.0]);
        let m = manifest(vec![big, near]);

        let coord = Coordinate::new(30.4, -60.05); // inside "big", near "near"
        assert_eq!(select(&m, coord).unwrap().tile_id, "big");
    }

    #[test]
    fn outside_all_boxes_picks_nearest_centroid() {
        let maine = tile("maine", [-71.0, 42.0, -69.0, 44.5]);
        let brittany = tile("brittany", [-6.0, 47.0, -2.0, 49.5]);
        let m = manifest(vec![maine, brittany]);

        // Mid-Atlantic, slightly west of center: Maine's centroid is closer.
        let coord = Coordinate::new(43.0, -45.0);
        assert_eq!(select(&m, coord).unwrap().tile_id, "maine");

        let coord = Coordinate::new(47.0, -15.0);
        assert_eq!(select(&m, coord).unwrap().tile_id, "brittany");
    }

    #[test]
    fn first_containment_match_wins() {
        let a = tile("a", [-71.0, 42.0, -69.0, 44.5]);
        let b = tile("b", [-71.0, 42.0, -69.0, 44.5]); // identical bounds
        let m = manifest(vec![a, b]);
        assert_eq!(
            select(&m, Coordinate::new(43.0, -70.0)).unwrap().tile_id,
            "a"
        );
    }

    #[test]
    fn empty_manifest_selects_nothing() {
        assert!(select(&manifest(Vec::new()), Coordinate::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn haversine_sanity() {
        // Portland, ME to Boston, MA is roughly 150 km.
        let d = great_circle_km(
            Coordinate::new(43.66, -70.25),
            Coordinate::new(42.36, -71.06),
        );
        assert!((140.0..170.0).contains(&d), "got {d} km");
    }
}
