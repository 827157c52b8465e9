//! Route plotting: join GPX waypoints along the walkable path network.
//!
//! Waypoints are validated, snapped onto the graph, and connected pairwise
//! by shortest path. Consecutive waypoints also get a direct high-cost
//! connector edge so a gap in the network degrades to a straight leg instead
//! of failing the whole route.

use log::{info, warn};

use crate::error::{Result, RouteToolError};
use crate::geo_utils::haversine_distance;
use crate::gpx::{GpxFile, Track, TrackPoint, TrackSegment};
use crate::graph::{PathGraph, SnappedNode, DEFAULT_SNAP_THRESHOLD_M};
use crate::Bounds;

/// Route plotting parameters.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Maximum number of waypoints accepted
    pub max_points: usize,
    /// Maximum straight-line distance between consecutive waypoints, in km
    pub max_leg_km: f64,
    /// Bounding box expansion around the waypoints, in degrees
    pub buffer_degrees: f64,
    /// Maximum distance a waypoint may sit off the network, in meters
    pub snap_threshold_m: f64,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            max_points: 50,
            max_leg_km: 20.0,
            buffer_degrees: 0.01,
            snap_threshold_m: DEFAULT_SNAP_THRESHOLD_M,
        }
    }
}

/// Outcome of a plotting run.
#[derive(Debug, Default)]
pub struct RouteSummary {
    /// Waypoints attached to the network
    pub snapped: usize,
    /// Waypoints dropped, with the reason
    pub skipped: Vec<String>,
    /// Legs routed along the network
    pub network_legs: usize,
    /// Legs that fell back to a straight line
    pub fallback_legs: usize,
    /// Total route length in meters
    pub total_distance_m: f64,
}

/// Check waypoint count and consecutive leg distances.
pub fn validate_waypoints(gpx: &GpxFile, options: &RouteOptions) -> Result<()> {
    if gpx.waypoints.len() > options.max_points {
        return Err(RouteToolError::TooManyWaypoints {
            count: gpx.waypoints.len(),
            max: options.max_points,
        });
    }

    for (index, pair) in gpx.waypoints.windows(2).enumerate() {
        let distance_km = haversine_distance(&pair[0].point(), &pair[1].point()) / 1000.0;
        if distance_km > options.max_leg_km {
            return Err(RouteToolError::LegTooLong {
                from_index: index,
                to_index: index + 1,
                distance_km,
                max_km: options.max_leg_km,
            });
        }
    }

    Ok(())
}

/// Buffered bounding box around the waypoints.
pub fn waypoint_bounds(gpx: &GpxFile, options: &RouteOptions) -> Result<Bounds> {
    let points: Vec<_> = gpx.waypoints.iter().map(|w| w.point()).collect();
    let bounds = Bounds::from_points(&points).ok_or_else(|| RouteToolError::Config {
        message: "input GPX has no waypoints to route between".to_string(),
    })?;
    Ok(bounds.buffered(options.buffer_degrees))
}

/// Plot the route through the waypoints along `graph`.
///
/// Returns a GPX file holding the original waypoints plus one track with the
/// concatenated leg geometry, and a summary of what happened on the way.
pub fn plot_route(
    source: &GpxFile,
    graph: &mut PathGraph,
    options: &RouteOptions,
) -> Result<(GpxFile, RouteSummary)> {
    validate_waypoints(source, options)?;

    let mut summary = RouteSummary::default();

    // Snap every waypoint; the ones too far off the network are dropped
    let mut snapped: Vec<SnappedNode> = Vec::new();
    for (index, waypoint) in source.waypoints.iter().enumerate() {
        let label = waypoint
            .name
            .clone()
            .unwrap_or_else(|| format!("waypoint {}", index + 1));
        match graph.snap(&waypoint.point(), options.snap_threshold_m) {
            Some(node) => {
                if node.is_virtual {
                    info!("Snapped '{}' to a new point {:.1} m away", label, node.distance_m);
                }
                snapped.push(node);
            }
            None => {
                warn!(
                    "'{}' is more than {:.0} m from any path, skipping",
                    label, options.snap_threshold_m
                );
                summary.skipped.push(label);
            }
        }
    }
    summary.snapped = snapped.len();

    if snapped.len() < 2 {
        return Err(RouteToolError::Config {
            message: format!(
                "need at least 2 routable waypoints, only {} snapped onto the network",
                snapped.len()
            ),
        });
    }

    // High-cost connectors between consecutive pairs keep routing alive
    // across network gaps
    for pair in snapped.windows(2) {
        if pair[0].node != pair[1].node && graph.edge_weight(pair[0].node, pair[1].node).is_none() {
            graph.add_fallback_edge(pair[0].node, pair[1].node);
        }
    }

    let mut geometry: Vec<TrackPoint> = Vec::new();
    for pair in snapped.windows(2) {
        let (from, to) = (pair[0].node, pair[1].node);
        if from == to {
            continue;
        }
        let leg_points = match graph.shortest_path(from, to) {
            Some((nodes, length_m)) => {
                summary.network_legs += 1;
                summary.total_distance_m += length_m;
                graph.path_points(&nodes)
            }
            None => {
                // Connector edges should prevent this; straight leg as a
                // last resort
                warn!("No path between nodes {} and {}, drawing a straight leg", from, to);
                summary.fallback_legs += 1;
                let points: Vec<_> = [from, to]
                    .iter()
                    .filter_map(|&n| graph.node_point(n))
                    .collect();
                summary.total_distance_m += points
                    .windows(2)
                    .map(|w| haversine_distance(&w[0], &w[1]))
                    .sum::<f64>();
                points
            }
        };

        for point in leg_points {
            let candidate = TrackPoint::new(point.latitude, point.longitude);
            // Legs share endpoints; avoid doubling the joint
            if geometry.last() != Some(&candidate) {
                geometry.push(candidate);
            }
        }
    }

    info!(
        "Routed {} waypoints over {} legs, {:.1} km total",
        summary.snapped,
        summary.network_legs + summary.fallback_legs,
        summary.total_distance_m / 1000.0
    );

    let track_name = source
        .name
        .clone()
        .unwrap_or_else(|| "Plotted Route".to_string());
    let output = GpxFile {
        creator: source.creator.clone(),
        name: source.name.clone(),
        description: source.description.clone(),
        waypoints: source.waypoints.clone(),
        tracks: vec![Track {
            name: Some(track_name),
            segments: vec![TrackSegment { points: geometry }],
        }],
    };

    Ok((output, summary))
}
