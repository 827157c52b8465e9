//! Inference of unmapped paths from a recorded GPX track.
//!
//! Compares every track point against the mapped path network and extracts
//! the stretches that run consistently off it. Those stretches are the
//! candidates for paths that exist on the ground but not in OSM.

use log::info;

use crate::gpx::{GpxFile, Track, TrackPoint, TrackSegment};
use crate::graph::PathGraph;
use crate::GpsPoint;

/// Distance assigned to a point when the graph has no edge near it at all.
pub const NO_EDGE_DISTANCE_M: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct InferOptions {
    /// Points farther than this from any mapped path count as off-network,
    /// in meters
    pub tolerance_m: f64,
    /// Minimum consecutive off-network points that form a segment
    pub min_segment_points: usize,
    /// Bounding box expansion around the track, in degrees
    pub buffer_degrees: f64,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            tolerance_m: 5.0,
            min_segment_points: 3,
            buffer_degrees: 0.01,
        }
    }
}

/// Counters from an inference run.
#[derive(Debug, Default, PartialEq)]
pub struct InferStats {
    pub track_points: usize,
    pub off_network_points: usize,
    pub segments: usize,
}

/// Distance from each point to the nearest mapped edge.
pub fn point_distances(graph: &PathGraph, points: &[GpsPoint]) -> Vec<f64> {
    points
        .iter()
        .map(|p| {
            graph
                .distance_to_nearest_edge(p)
                .unwrap_or(NO_EDGE_DISTANCE_M)
        })
        .collect()
}

/// Maximal runs of consecutive points beyond the tolerance, dropping runs
/// shorter than `min_segment_points`.
pub fn off_network_segments(
    points: &[GpsPoint],
    distances: &[f64],
    options: &InferOptions,
) -> Vec<Vec<GpsPoint>> {
    let mut segments = Vec::new();
    let mut current: Vec<GpsPoint> = Vec::new();

    for (point, &distance) in points.iter().zip(distances) {
        if distance > options.tolerance_m {
            current.push(*point);
        } else if !current.is_empty() {
            if current.len() >= options.min_segment_points {
                segments.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= options.min_segment_points {
        segments.push(current);
    }

    segments
}

/// GPX file holding one track per inferred segment.
///
/// An empty segment list still produces a valid, empty file.
pub fn new_paths_file(source: &GpxFile, segments: &[Vec<GpsPoint>]) -> GpxFile {
    GpxFile {
        creator: Some(crate::gpx::DEFAULT_CREATOR.to_string()),
        name: source.name.as_ref().map(|n| format!("{} - new paths", n)),
        description: None,
        waypoints: Vec::new(),
        tracks: segments
            .iter()
            .enumerate()
            .map(|(index, segment)| Track {
                name: Some(format!("New Path Segment {}", index + 1)),
                segments: vec![TrackSegment {
                    points: segment
                        .iter()
                        .map(|p| TrackPoint::new(p.latitude, p.longitude))
                        .collect(),
                }],
            })
            .collect(),
    }
}

/// Run the full inference over a recorded GPX file.
pub fn infer_new_paths(
    source: &GpxFile,
    graph: &PathGraph,
    options: &InferOptions,
) -> (GpxFile, InferStats) {
    let points = source.track_points();
    let distances = point_distances(graph, &points);
    let segments = off_network_segments(&points, &distances, options);

    let stats = InferStats {
        track_points: points.len(),
        off_network_points: distances
            .iter()
            .filter(|&&d| d > options.tolerance_m)
            .count(),
        segments: segments.len(),
    };
    info!(
        "{} of {} track points off-network, {} new path segments",
        stats.off_network_points, stats.track_points, stats.segments
    );

    (new_paths_file(source, &segments), stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;
    use crate::graph::EdgeWeight;

    // Single east-west path at 54.45N between -3.22 and -3.20
    fn path_graph() -> PathGraph {
        let mut g = PathGraph::new();
        g.add_node(1, GpsPoint::new(54.45, -3.22));
        g.add_node(2, GpsPoint::new(54.45, -3.21));
        g.add_node(3, GpsPoint::new(54.45, -3.20));
        let w12 = haversine_distance(&g.node_point(1).unwrap(), &g.node_point(2).unwrap());
        let w23 = haversine_distance(&g.node_point(2).unwrap(), &g.node_point(3).unwrap());
        g.add_edge(1, 2, EdgeWeight::flat(w12));
        g.add_edge(2, 3, EdgeWeight::flat(w23));
        g.build_index();
        g
    }

    fn on_path(lon: f64) -> GpsPoint {
        GpsPoint::new(54.45, lon)
    }

    fn off_path(lon: f64) -> GpsPoint {
        // ~110 m north of the path
        GpsPoint::new(54.451, lon)
    }

    #[test]
    fn test_point_distances() {
        let g = path_graph();
        let distances = point_distances(&g, &[on_path(-3.215), off_path(-3.215)]);
        assert!(distances[0] < 1.0);
        assert!(distances[1] > 100.0 && distances[1] < 120.0);
    }

    #[test]
    fn test_empty_graph_uses_no_edge_distance() {
        let g = PathGraph::new();
        let distances = point_distances(&g, &[on_path(-3.215)]);
        assert_eq!(distances, vec![NO_EDGE_DISTANCE_M]);
    }

    #[test]
    fn test_segmentation_extracts_run() {
        let points = vec![
            on_path(-3.219),
            off_path(-3.218),
            off_path(-3.217),
            off_path(-3.216),
            on_path(-3.215),
        ];
        let g = path_graph();
        let distances = point_distances(&g, &points);
        let segments = off_network_segments(&points, &distances, &InferOptions::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 3);
    }

    #[test]
    fn test_short_runs_dropped() {
        let points = vec![on_path(-3.219), off_path(-3.218), on_path(-3.217)];
        let g = path_graph();
        let distances = point_distances(&g, &points);
        let segments = off_network_segments(&points, &distances, &InferOptions::default());
        assert!(segments.is_empty());
    }

    #[test]
    fn test_trailing_run_kept() {
        let points = vec![
            on_path(-3.219),
            off_path(-3.218),
            off_path(-3.217),
            off_path(-3.216),
        ];
        let g = path_graph();
        let distances = point_distances(&g, &points);
        let segments = off_network_segments(&points, &distances, &InferOptions::default());
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_infer_produces_named_tracks() {
        let mut source = GpxFile::default();
        source.name = Some("Morning Run".to_string());
        source.tracks = vec![Track {
            name: None,
            segments: vec![TrackSegment {
                points: vec![
                    TrackPoint::new(54.451, -3.218),
                    TrackPoint::new(54.451, -3.217),
                    TrackPoint::new(54.451, -3.216),
                ],
            }],
        }];

        let g = path_graph();
        let (output, stats) = infer_new_paths(&source, &g, &InferOptions::default());
        assert_eq!(stats.track_points, 3);
        assert_eq!(stats.off_network_points, 3);
        assert_eq!(stats.segments, 1);
        assert_eq!(output.tracks.len(), 1);
        assert_eq!(
            output.tracks[0].name,
            Some("New Path Segment 1".to_string())
        );
    }

    #[test]
    fn test_no_segments_yields_empty_file() {
        let mut source = GpxFile::default();
        source.tracks = vec![Track {
            name: None,
            segments: vec![TrackSegment {
                points: vec![TrackPoint::new(54.45, -3.215)],
            }],
        }];
        let g = path_graph();
        let (output, stats) = infer_new_paths(&source, &g, &InferOptions::default());
        assert_eq!(stats.segments, 0);
        assert!(output.tracks.is_empty());
    }
}
