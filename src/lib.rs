//! GPX tooling for a fell-running route collection.
//!
//! The crate covers the transformations the route pages are built from:
//!
//! - [`summits`]: fix summit waypoints against the Database of British and
//!   Irish Hills ([`hills`]).
//! - [`elevation`]: fetch, smooth, and validate track elevations from public
//!   elevation APIs.
//! - [`route`]: plot a route between waypoints along the walkable OSM path
//!   network ([`overpass`], [`graph`], [`cache`]).
//! - [`derive`]: fan a master GPX file out into its derivative files.
//! - [`paths`]: infer unmapped paths from a recorded track.
//!
//! All file I/O goes through the crate's own GPX reader/writer ([`gpx`]),
//! which round-trips the project's DoBIH waypoint extension.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod cache;
pub mod derive;
pub mod elevation;
pub mod error;
pub mod geo_utils;
pub mod gpx;
pub mod graph;
pub mod hills;
pub mod overpass;
pub mod paths;
pub mod route;
pub mod summits;

pub use error::{Result, RouteToolError};

/// A GPS coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check whether the coordinate is within valid GPS ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Bounding box of a point set; `None` when the set is empty.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        };
        for p in &points[1..] {
            bounds.min_lat = bounds.min_lat.min(p.latitude);
            bounds.max_lat = bounds.max_lat.max(p.latitude);
            bounds.min_lon = bounds.min_lon.min(p.longitude);
            bounds.max_lon = bounds.max_lon.max(p.longitude);
        }
        Some(bounds)
    }

    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Expand the box by `degrees` on every side.
    pub fn buffered(&self, degrees: f64) -> Self {
        Self {
            min_lat: self.min_lat - degrees,
            max_lat: self.max_lat + degrees,
            min_lon: self.min_lon - degrees,
            max_lon: self.max_lon + degrees,
        }
    }

    /// Stable cache key for this box: SHA-256 over the rounded coordinates.
    ///
    /// Rounding to five decimals (~1 m) keeps float noise from splitting the
    /// cache.
    pub fn cache_key(&self) -> String {
        let text = format!(
            "{:.5},{:.5},{:.5},{:.5}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        );
        let digest = Sha256::digest(text.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validity() {
        assert!(GpsPoint::new(54.45, -3.21).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let points = vec![
            GpsPoint::new(54.4, -3.2),
            GpsPoint::new(54.5, -3.3),
            GpsPoint::new(54.45, -3.1),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 54.4);
        assert_eq!(bounds.max_lat, 54.5);
        assert_eq!(bounds.min_lon, -3.3);
        assert_eq!(bounds.max_lon, -3.1);
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_bounds_center_and_buffer() {
        let bounds = Bounds {
            min_lat: 54.4,
            max_lat: 54.5,
            min_lon: -3.3,
            max_lon: -3.1,
        };
        let center = bounds.center();
        assert!((center.latitude - 54.45).abs() < 1e-9);
        assert!((center.longitude - (-3.2)).abs() < 1e-9);

        let buffered = bounds.buffered(0.01);
        assert!((buffered.min_lat - 54.39).abs() < 1e-9);
        assert!((buffered.max_lon - (-3.09)).abs() < 1e-9);
    }

    #[test]
    fn test_cache_key_stable_and_distinct() {
        let a = Bounds {
            min_lat: 54.4,
            max_lat: 54.5,
            min_lon: -3.3,
            max_lon: -3.1,
        };
        let b = Bounds {
            min_lat: 54.4,
            max_lat: 54.5,
            min_lon: -3.3,
            max_lon: -3.2,
        };
        assert_eq!(a.cache_key(), a.cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().len(), 64);

        // Sub-meter float noise keys identically
        let noisy = Bounds {
            min_lat: 54.400000001,
            ..a
        };
        assert_eq!(a.cache_key(), noisy.cache_key());
    }
}
