//! Great-circle distance and nearest-facility ranking
//!
//! Pure functions over coordinates; no I/O and no state.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS84 latitude/longitude in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Haversine distance between two coordinates, in kilometres.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// An item paired with its distance from the query point.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub distance_km: f64,
}

/// Returns the item closest to `origin`.
///
/// Items for which `locate` yields `None` are skipped. On equal distances the
/// first item in input order wins.
pub fn nearest<'a, T, F>(origin: Coordinate, items: &'a [T], locate: F) -> Option<Ranked<&'a T>>
where
    F: Fn(&T) -> Option<Coordinate>,
{
    let mut best: Option<Ranked<&'a T>> = None;
    for item in items {
        let Some(at) = locate(item) else { continue };
        let distance_km = haversine_km(origin, at);
        match &best {
            Some(current) if current.distance_km <= distance_km => {}
            _ => best = Some(Ranked { item, distance_km }),
        }
    }
    best
}

/// All locatable items sorted by ascending distance (stable on ties).
pub fn rank<'a, T, F>(origin: Coordinate, items: &'a [T], locate: F) -> Vec<Ranked<&'a T>>
where
    F: Fn(&T) -> Option<Coordinate>,
{
    let mut ranked: Vec<Ranked<&'a T>> = items
        .iter()
        .filter_map(|item| {
            locate(item).map(|at| Ranked {
                item,
                distance_km: haversine_km(origin, at),
            })
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lot {
        name: &'static str,
        at: Option<Coordinate>,
    }

    fn lots() -> Vec<Lot> {
        vec![
            Lot { name: "City Center Lot", at: Some(Coordinate::new(28.6139, 77.209)) },
            Lot { name: "Green Park Lot", at: Some(Coordinate::new(28.5494, 77.2001)) },
            Lot { name: "Cyber City Lot", at: Some(Coordinate::new(28.4944, 77.088)) },
            Lot { name: "Airport Lot", at: Some(Coordinate::new(28.5562, 77.1)) },
            Lot { name: "Noida Sector 18 Lot", at: Some(Coordinate::new(28.5672, 77.321)) },
        ]
    }

    /// Independent spherical-law-of-cosines reference.
    fn reference_km(a: Coordinate, b: Coordinate) -> f64 {
        let (p1, p2) = (a.latitude.to_radians(), b.latitude.to_radians());
        let dl = (b.longitude - a.longitude).to_radians();
        let cos_c = p1.sin() * p2.sin() + p1.cos() * p2.cos() * dl.cos();
        EARTH_RADIUS_KM * cos_c.clamp(-1.0, 1.0).acos()
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = haversine_km(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((d - 111.1949).abs() < 0.001);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = Coordinate::new(28.6, 77.2);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn city_center_is_nearest_to_connaught_place_query() {
        let origin = Coordinate::new(28.60, 77.20);
        let lots = lots();
        let best = nearest(origin, &lots, |l| l.at).unwrap();

        assert_eq!(best.item.name, "City Center Lot");
        let expected = reference_km(origin, Coordinate::new(28.6139, 77.209));
        assert!((best.distance_km - expected).abs() < 0.01);
        assert!((best.distance_km - 1.7779).abs() < 0.01);
    }

    #[test]
    fn ties_go_to_first_in_input_order() {
        let origin = Coordinate::new(0.0, 0.0);
        let lots = vec![
            Lot { name: "east", at: Some(Coordinate::new(0.0, 1.0)) },
            Lot { name: "west", at: Some(Coordinate::new(0.0, -1.0)) },
        ];
        assert_eq!(nearest(origin, &lots, |l| l.at).unwrap().item.name, "east");
    }

    #[test]
    fn unlocated_items_are_skipped() {
        let origin = Coordinate::new(28.60, 77.20);
        let lots = vec![
            Lot { name: "unknown", at: None },
            Lot { name: "Airport Lot", at: Some(Coordinate::new(28.5562, 77.1)) },
        ];
        assert_eq!(nearest(origin, &lots, |l| l.at).unwrap().item.name, "Airport Lot");
        assert!(nearest::<Lot, _>(origin, &[], |l| l.at).is_none());
    }

    #[test]
    fn rank_orders_by_distance() {
        let lots = lots();
        let ranked = rank(Coordinate::new(28.60, 77.20), &lots, |l| l.at);
        let names: Vec<_> = ranked.iter().map(|r| r.item.name).collect();
        assert_eq!(
            names,
            vec![
                "City Center Lot",
                "Green Park Lot",
                "Airport Lot",
                "Noida Sector 18 Lot",
                "Cyber City Lot"
            ]
        );
    }

    #[test]
    fn coordinate_validation() {
        assert!(Coordinate::new(28.6, 77.2).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
    }
}
