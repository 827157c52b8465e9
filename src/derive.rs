//! Derivative GPX files from a single source route.
//!
//! One master file fans out into the variants the route pages link to:
//! summit waypoints only, other points of interest, the bare track, the full
//! file, a simplified track for map overlays, and one file per leg.

use std::path::{Path, PathBuf};

use geo::{Coord, LineString, Simplify};
use log::info;

use crate::error::Result;
use crate::gpx::{self, GpxFile, Track, TrackPoint, TrackSegment};

/// Default Douglas-Peucker tolerance, in degrees (~10 m).
pub const DEFAULT_SIMPLIFY_EPSILON: f64 = 0.0001;

#[derive(Debug, Clone)]
pub struct DeriveOptions {
    /// File name prefix, e.g. `wasdale-horseshoe`
    pub prefix: String,
    /// Douglas-Peucker tolerance for the simplified variant, in degrees
    pub simplify_epsilon: f64,
}

impl DeriveOptions {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            simplify_epsilon: DEFAULT_SIMPLIFY_EPSILON,
        }
    }
}

fn base_file(source: &GpxFile) -> GpxFile {
    GpxFile {
        creator: Some(gpx::DEFAULT_CREATOR.to_string()),
        name: source.name.clone(),
        description: source.description.clone(),
        waypoints: Vec::new(),
        tracks: Vec::new(),
    }
}

/// Summit waypoints only, `sym` normalized to exactly `Summit`.
pub fn summits_file(source: &GpxFile) -> GpxFile {
    let mut out = base_file(source);
    out.waypoints = source
        .waypoints
        .iter()
        .filter(|w| w.is_summit())
        .cloned()
        .map(|mut w| {
            w.symbol = Some("Summit".to_string());
            w
        })
        .collect();
    out
}

/// Non-summit waypoints; unnamed ones become `POI <n>`, missing symbols
/// become `Info`.
pub fn points_of_interest_file(source: &GpxFile) -> GpxFile {
    let mut out = base_file(source);
    let mut counter = 0usize;
    out.waypoints = source
        .waypoints
        .iter()
        .filter(|w| !w.is_summit())
        .cloned()
        .map(|mut w| {
            counter += 1;
            if w.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                w.name = Some(format!("POI {}", counter));
            }
            if w.symbol.is_none() {
                w.symbol = Some("Info".to_string());
            }
            w
        })
        .collect();
    out
}

/// Tracks only, no waypoints.
pub fn track_file(source: &GpxFile) -> GpxFile {
    let mut out = base_file(source);
    out.tracks = source.tracks.clone();
    out
}

/// Full copy with the project creator.
pub fn detailed_file(source: &GpxFile) -> GpxFile {
    let mut out = base_file(source);
    out.waypoints = source.waypoints.clone();
    out.tracks = source.tracks.clone();
    out
}

/// All segments merged into one track and Douglas-Peucker simplified.
///
/// Elevations survive simplification: the surviving coordinates are matched
/// back to the original points in order.
pub fn simplified_file(source: &GpxFile, epsilon: f64) -> GpxFile {
    let merged: Vec<TrackPoint> = source
        .tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .flat_map(|s| s.points.iter().cloned())
        .collect();

    let line = LineString::from(
        merged
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect::<Vec<_>>(),
    );
    let simplified = line.simplify(&epsilon);

    // Walk both sequences in order; simplification only removes points
    let mut kept = Vec::with_capacity(simplified.0.len());
    let mut cursor = merged.iter();
    for coord in &simplified.0 {
        for point in cursor.by_ref() {
            if point.longitude == coord.x && point.latitude == coord.y {
                kept.push(point.clone());
                break;
            }
        }
    }

    let track_name = match &source.name {
        Some(name) => format!("{} (Simplified)", name),
        None => "Track (Simplified)".to_string(),
    };

    let mut out = base_file(source);
    out.tracks = vec![Track {
        name: Some(track_name),
        segments: vec![TrackSegment { points: kept }],
    }];
    out
}

/// One file per source track, in order.
pub fn leg_files(source: &GpxFile) -> Vec<GpxFile> {
    source
        .tracks
        .iter()
        .map(|track| {
            let mut out = base_file(source);
            out.name = track.name.clone();
            out.tracks = vec![track.clone()];
            out
        })
        .collect()
}

/// Write every derivative into `out_dir` and return the written paths.
pub fn derive_all(source: &GpxFile, out_dir: &Path, options: &DeriveOptions) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    let mut write = |suffix: String, file: &GpxFile| -> Result<()> {
        let path = out_dir.join(format!("{}-{}.gpx", options.prefix, suffix));
        gpx::write_file(&path, file)?;
        written.push(path);
        Ok(())
    };

    write("summits".to_string(), &summits_file(source))?;
    write(
        "points-of-interest".to_string(),
        &points_of_interest_file(source),
    )?;
    write("track".to_string(), &track_file(source))?;
    write("detailed".to_string(), &detailed_file(source))?;
    write(
        "simplified".to_string(),
        &simplified_file(source, options.simplify_epsilon),
    )?;
    for (index, leg) in leg_files(source).iter().enumerate() {
        write(format!("leg-{}", index + 1), leg)?;
    }

    info!(
        "Wrote {} derivative files to {}",
        written.len(),
        out_dir.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpx::Waypoint;

    fn source() -> GpxFile {
        let mut summit = Waypoint::new(54.454, -3.212);
        summit.name = Some("Scafell Pike".to_string());
        summit.symbol = Some("summit".to_string());
        summit.dobih_number = Some(2283);

        let mut unnamed = Waypoint::new(54.46, -3.20);
        unnamed.symbol = None;
        unnamed.name = None;

        let mut cafe = Waypoint::new(54.47, -3.19);
        cafe.name = Some("Cafe".to_string());
        cafe.symbol = Some("Food".to_string());

        let leg = |lat: f64| Track {
            name: Some(format!("Leg at {}", lat)),
            segments: vec![TrackSegment {
                points: (0..5)
                    .map(|i| TrackPoint::new(lat, -3.21 + i as f64 * 0.001))
                    .collect(),
            }],
        };

        GpxFile {
            creator: Some("some-editor".to_string()),
            name: Some("Wasdale Round".to_string()),
            description: None,
            waypoints: vec![summit, unnamed, cafe],
            tracks: vec![leg(54.45), leg(54.46)],
        }
    }

    #[test]
    fn test_summits_normalizes_symbol() {
        let out = summits_file(&source());
        assert_eq!(out.waypoints.len(), 1);
        assert_eq!(out.waypoints[0].symbol, Some("Summit".to_string()));
        assert_eq!(out.waypoints[0].dobih_number, Some(2283));
        assert!(out.tracks.is_empty());
    }

    #[test]
    fn test_points_of_interest_fills_defaults() {
        let out = points_of_interest_file(&source());
        assert_eq!(out.waypoints.len(), 2);
        assert_eq!(out.waypoints[0].name, Some("POI 1".to_string()));
        assert_eq!(out.waypoints[0].symbol, Some("Info".to_string()));
        assert_eq!(out.waypoints[1].name, Some("Cafe".to_string()));
    }

    #[test]
    fn test_track_file_has_no_waypoints() {
        let out = track_file(&source());
        assert!(out.waypoints.is_empty());
        assert_eq!(out.tracks.len(), 2);
    }

    #[test]
    fn test_detailed_keeps_everything_with_project_creator() {
        let out = detailed_file(&source());
        assert_eq!(out.waypoints.len(), 3);
        assert_eq!(out.tracks.len(), 2);
        assert_eq!(out.creator, Some(gpx::DEFAULT_CREATOR.to_string()));
    }

    #[test]
    fn test_simplified_merges_and_reduces() {
        let mut src = source();
        // A long straight line collapses to its endpoints
        src.tracks = vec![Track {
            name: None,
            segments: vec![TrackSegment {
                points: (0..100)
                    .map(|i| {
                        let mut p = TrackPoint::new(54.45, -3.21 + i as f64 * 0.0001);
                        p.elevation = Some(100.0 + i as f64);
                        p
                    })
                    .collect(),
            }],
        }];
        let out = simplified_file(&src, DEFAULT_SIMPLIFY_EPSILON);
        assert_eq!(out.tracks.len(), 1);
        let points = &out.tracks[0].segments[0].points;
        assert!(points.len() < 100);
        assert!(points.len() >= 2);
        // Elevation survives
        assert_eq!(points[0].elevation, Some(100.0));
        assert_eq!(
            out.tracks[0].name,
            Some("Wasdale Round (Simplified)".to_string())
        );
    }

    #[test]
    fn test_leg_files_one_per_track() {
        let legs = leg_files(&source());
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].tracks.len(), 1);
        assert_eq!(legs[0].name, legs[0].tracks[0].name);
    }

    #[test]
    fn test_derive_all_writes_expected_names() {
        let dir = tempfile::tempdir().unwrap();
        let written = derive_all(&source(), dir.path(), &DeriveOptions::new("wasdale")).unwrap();

        let names: Vec<String> = written
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert!(names.contains(&"wasdale-summits.gpx".to_string()));
        assert!(names.contains(&"wasdale-points-of-interest.gpx".to_string()));
        assert!(names.contains(&"wasdale-track.gpx".to_string()));
        assert!(names.contains(&"wasdale-detailed.gpx".to_string()));
        assert!(names.contains(&"wasdale-simplified.gpx".to_string()));
        assert!(names.contains(&"wasdale-leg-1.gpx".to_string()));
        assert!(names.contains(&"wasdale-leg-2.gpx".to_string()));
        assert_eq!(written.len(), 7);
    }
}
