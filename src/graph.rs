//! Walkable path network with spatial snapping and shortest-path routing.
//!
//! The graph keeps OSM node ids as `i64` keys in an undirected graph map,
//! with a coordinate side table and two R-trees: one over the nodes for
//! nearest-node snapping, one over the edges so off-network waypoints can be
//! attached to the closest path segment through a virtual node.

use std::collections::HashMap;

use log::debug;
use petgraph::algo::astar;
use petgraph::graphmap::UnGraphMap;
use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_distance, project_onto_segment};
use crate::GpsPoint;

/// Waypoints within this distance of an existing node reuse it.
pub const SNAP_REUSE_THRESHOLD_M: f64 = 5.0;

/// Default maximum distance from the network at which a waypoint is still
/// attached via a virtual node.
pub const DEFAULT_SNAP_THRESHOLD_M: f64 = 100.0;

/// Cost of a direct connector edge between waypoints the network cannot
/// join. High enough that any real path is preferred.
pub const FALLBACK_EDGE_COST: f64 = 10_000.0;

/// Edge attributes: physical length plus the routing cost.
///
/// Cost equals length unless an ascent penalty was applied when the graph
/// was built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeWeight {
    pub length_m: f64,
    pub cost: f64,
}

impl EdgeWeight {
    pub fn flat(length_m: f64) -> Self {
        Self {
            length_m,
            cost: length_m,
        }
    }
}

type NodeEntry = GeomWithData<[f64; 2], i64>;
type EdgeEntry = GeomWithData<Line<[f64; 2]>, (i64, i64)>;

/// How a waypoint was attached to the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappedNode {
    pub node: i64,
    /// Distance from the waypoint to the snapped position, in meters
    pub distance_m: f64,
    /// True when a virtual node was inserted on an edge
    pub is_virtual: bool,
}

/// Serializable form of the graph, used for on-disk caching.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<(i64, f64, f64)>,
    pub edges: Vec<(i64, i64, EdgeWeight)>,
}

/// Undirected walkable path network.
pub struct PathGraph {
    graph: UnGraphMap<i64, EdgeWeight>,
    coords: HashMap<i64, GpsPoint>,
    node_index: RTree<NodeEntry>,
    edge_index: RTree<EdgeEntry>,
    next_virtual_id: i64,
}

impl PathGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraphMap::new(),
            coords: HashMap::new(),
            node_index: RTree::new(),
            edge_index: RTree::new(),
            next_virtual_id: -1,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_point(&self, node: i64) -> Option<GpsPoint> {
        self.coords.get(&node).copied()
    }

    pub fn add_node(&mut self, id: i64, point: GpsPoint) {
        self.graph.add_node(id);
        self.coords.insert(id, point);
    }

    /// Add an undirected edge; both endpoints must already have coordinates.
    pub fn add_edge(&mut self, a: i64, b: i64, weight: EdgeWeight) {
        self.graph.add_edge(a, b, weight);
    }

    pub fn edge_weight(&self, a: i64, b: i64) -> Option<EdgeWeight> {
        self.graph.edge_weight(a, b).copied()
    }

    /// Rebuild both R-trees after bulk insertion. Must be called before
    /// snapping.
    pub fn build_index(&mut self) {
        let node_entries: Vec<NodeEntry> = self
            .coords
            .iter()
            .map(|(&id, p)| GeomWithData::new([p.longitude, p.latitude], id))
            .collect();

        let mut edge_entries = Vec::with_capacity(self.graph.edge_count());
        for (a, b, _) in self.graph.all_edges() {
            if let (Some(pa), Some(pb)) = (self.coords.get(&a), self.coords.get(&b)) {
                edge_entries.push(GeomWithData::new(
                    Line::new(
                        [pa.longitude, pa.latitude],
                        [pb.longitude, pb.latitude],
                    ),
                    (a, b),
                ));
            }
        }

        self.node_index = RTree::bulk_load(node_entries);
        self.edge_index = RTree::bulk_load(edge_entries);
        debug!(
            "Built spatial index over {} nodes and {} edges",
            self.graph.node_count(),
            self.graph.edge_count()
        );
    }

    /// Attach a waypoint to the network.
    ///
    /// Within [`SNAP_REUSE_THRESHOLD_M`] of a node the node is reused.
    /// Otherwise the nearest edge is found and, if the waypoint lies within
    /// `threshold_m` of it, a virtual node is inserted at the projection.
    /// Returns `None` when the waypoint is too far from any path.
    pub fn snap(&mut self, point: &GpsPoint, threshold_m: f64) -> Option<SnappedNode> {
        let query = [point.longitude, point.latitude];

        if let Some(nearest) = self.node_index.nearest_neighbor(&query) {
            let node = nearest.data;
            if let Some(node_point) = self.coords.get(&node) {
                let distance_m = haversine_distance(point, node_point);
                if distance_m <= SNAP_REUSE_THRESHOLD_M {
                    return Some(SnappedNode {
                        node,
                        distance_m,
                        is_virtual: false,
                    });
                }
            }
        }

        let nearest_edge = self.edge_index.nearest_neighbor(&query)?;
        let (a, b) = nearest_edge.data;
        let pa = self.coords.get(&a).copied()?;
        let pb = self.coords.get(&b).copied()?;

        let projection = project_onto_segment(point, &pa, &pb);
        if projection.distance_m > threshold_m {
            return None;
        }

        let virtual_id = self.next_virtual_id;
        self.next_virtual_id -= 1;

        let length_a = haversine_distance(&pa, &projection.point);
        let length_b = haversine_distance(&pb, &projection.point);
        self.add_node(virtual_id, projection.point);
        self.add_edge(a, virtual_id, EdgeWeight::flat(length_a));
        self.add_edge(virtual_id, b, EdgeWeight::flat(length_b));

        debug!(
            "Inserted virtual node {} on edge {}-{} ({:.1} m off-path)",
            virtual_id, a, b, projection.distance_m
        );

        Some(SnappedNode {
            node: virtual_id,
            distance_m: projection.distance_m,
            is_virtual: true,
        })
    }

    /// Shortest path between two nodes by edge cost.
    ///
    /// Returns the node sequence and the physical length of the path in
    /// meters, or `None` when the nodes are not connected.
    pub fn shortest_path(&self, from: i64, to: i64) -> Option<(Vec<i64>, f64)> {
        let goal = self.coords.get(&to).copied()?;

        let (_, nodes) = astar(
            &self.graph,
            from,
            |n| n == to,
            |(_, _, w)| w.cost,
            |n| {
                self.coords
                    .get(&n)
                    .map(|p| haversine_distance(p, &goal))
                    .unwrap_or(0.0)
            },
        )?;

        let length_m = nodes
            .windows(2)
            .filter_map(|w| self.graph.edge_weight(w[0], w[1]))
            .map(|e| e.length_m)
            .sum();

        Some((nodes, length_m))
    }

    /// Geodesic distance from a point to the nearest edge segment, or `None`
    /// on a graph with no edges.
    pub fn distance_to_nearest_edge(&self, point: &GpsPoint) -> Option<f64> {
        let nearest = self
            .edge_index
            .nearest_neighbor(&[point.longitude, point.latitude])?;
        let (a, b) = nearest.data;
        let pa = self.coords.get(&a)?;
        let pb = self.coords.get(&b)?;
        Some(project_onto_segment(point, pa, pb).distance_m)
    }

    /// Recompute edge costs with an ascent penalty.
    ///
    /// `cost = length + factor * climb` for every edge whose endpoints both
    /// have an elevation; other edges keep cost equal to length. An
    /// undirected edge is climbed in one direction or the other, so the
    /// penalty is on the absolute elevation difference.
    pub fn apply_ascent_penalty(&mut self, elevations: &HashMap<i64, f64>, factor: f64) {
        let updates: Vec<(i64, i64, EdgeWeight)> = self
            .graph
            .all_edges()
            .map(|(a, b, w)| {
                let cost = match (elevations.get(&a), elevations.get(&b)) {
                    (Some(&ea), Some(&eb)) => w.length_m + factor * (ea - eb).abs(),
                    _ => w.length_m,
                };
                (
                    a,
                    b,
                    EdgeWeight {
                        length_m: w.length_m,
                        cost,
                    },
                )
            })
            .collect();
        for (a, b, w) in updates {
            self.graph.add_edge(a, b, w);
        }
    }

    /// Add a direct high-cost edge between two nodes, used when the network
    /// cannot join them.
    pub fn add_fallback_edge(&mut self, a: i64, b: i64) -> Option<f64> {
        let pa = self.coords.get(&a).copied()?;
        let pb = self.coords.get(&b).copied()?;
        let length_m = haversine_distance(&pa, &pb);
        self.add_edge(
            a,
            b,
            EdgeWeight {
                length_m,
                cost: FALLBACK_EDGE_COST,
            },
        );
        Some(length_m)
    }

    /// Resolve a node sequence to coordinates, skipping unknown ids.
    pub fn path_points(&self, nodes: &[i64]) -> Vec<GpsPoint> {
        nodes
            .iter()
            .filter_map(|id| self.coords.get(id).copied())
            .collect()
    }

    /// Capture the graph for serialization. Virtual nodes are excluded so a
    /// cached graph always restores to its pre-snapping state.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<(i64, f64, f64)> = self
            .coords
            .iter()
            .filter(|(&id, _)| id >= 0)
            .map(|(&id, p)| (id, p.latitude, p.longitude))
            .collect();
        nodes.sort_by_key(|&(id, _, _)| id);

        let mut edges: Vec<(i64, i64, EdgeWeight)> = self
            .graph
            .all_edges()
            .filter(|&(a, b, _)| a >= 0 && b >= 0)
            .map(|(a, b, w)| (a, b, *w))
            .collect();
        edges.sort_by_key(|&(a, b, _)| (a, b));

        GraphSnapshot { nodes, edges }
    }

    /// Restore a graph from a snapshot and build its spatial index.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for &(id, latitude, longitude) in &snapshot.nodes {
            graph.add_node(id, GpsPoint::new(latitude, longitude));
        }
        for &(a, b, weight) in &snapshot.edges {
            graph.add_edge(a, b, weight);
        }
        graph.build_index();
        graph
    }
}

impl Default for PathGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small east-west path along 54.45N with a spur to the north:
    //
    //   1 --- 2 --- 3
    //         |
    //         4
    fn test_graph() -> PathGraph {
        let mut g = PathGraph::new();
        g.add_node(1, GpsPoint::new(54.45, -3.22));
        g.add_node(2, GpsPoint::new(54.45, -3.21));
        g.add_node(3, GpsPoint::new(54.45, -3.20));
        g.add_node(4, GpsPoint::new(54.46, -3.21));

        let w12 = haversine_distance(&g.node_point(1).unwrap(), &g.node_point(2).unwrap());
        let w23 = haversine_distance(&g.node_point(2).unwrap(), &g.node_point(3).unwrap());
        let w24 = haversine_distance(&g.node_point(2).unwrap(), &g.node_point(4).unwrap());
        g.add_edge(1, 2, EdgeWeight::flat(w12));
        g.add_edge(2, 3, EdgeWeight::flat(w23));
        g.add_edge(2, 4, EdgeWeight::flat(w24));
        g.build_index();
        g
    }

    #[test]
    fn test_snap_reuses_close_node() {
        let mut g = test_graph();
        // ~2 m east of node 2
        let snapped = g
            .snap(&GpsPoint::new(54.45, -3.20997), DEFAULT_SNAP_THRESHOLD_M)
            .unwrap();
        assert_eq!(snapped.node, 2);
        assert!(!snapped.is_virtual);
        assert!(snapped.distance_m < SNAP_REUSE_THRESHOLD_M);
    }

    #[test]
    fn test_snap_inserts_virtual_node() {
        let mut g = test_graph();
        let nodes_before = g.node_count();
        // ~30 m north of the 1-2 edge, mid-way along it
        let snapped = g
            .snap(&GpsPoint::new(54.45027, -3.215), DEFAULT_SNAP_THRESHOLD_M)
            .unwrap();
        assert!(snapped.is_virtual);
        assert!(snapped.node < 0);
        assert_eq!(g.node_count(), nodes_before + 1);
        // Virtual node routes to both ends of the split edge
        assert!(g.shortest_path(snapped.node, 1).is_some());
        assert!(g.shortest_path(snapped.node, 3).is_some());
    }

    #[test]
    fn test_snap_rejects_distant_point() {
        let mut g = test_graph();
        // ~5 km north of the network
        let snapped = g.snap(&GpsPoint::new(54.50, -3.21), DEFAULT_SNAP_THRESHOLD_M);
        assert!(snapped.is_none());
    }

    #[test]
    fn test_shortest_path_follows_network() {
        let g = test_graph();
        let (nodes, length_m) = g.shortest_path(1, 3).unwrap();
        assert_eq!(nodes, vec![1, 2, 3]);
        // Two ~650 m legs
        assert!(length_m > 1_000.0 && length_m < 1_600.0);
    }

    #[test]
    fn test_shortest_path_disconnected() {
        let mut g = test_graph();
        g.add_node(99, GpsPoint::new(55.0, -4.0));
        assert!(g.shortest_path(1, 99).is_none());
    }

    #[test]
    fn test_fallback_edge_connects_components() {
        let mut g = test_graph();
        g.add_node(99, GpsPoint::new(54.47, -3.21));
        assert!(g.shortest_path(1, 99).is_none());
        let length = g.add_fallback_edge(4, 99).unwrap();
        assert!(length > 0.0);
        let (nodes, _) = g.shortest_path(1, 99).unwrap();
        assert_eq!(nodes, vec![1, 2, 4, 99]);
    }

    #[test]
    fn test_cost_preferred_over_length() {
        let mut g = PathGraph::new();
        g.add_node(1, GpsPoint::new(54.0, -3.0));
        g.add_node(2, GpsPoint::new(54.0, -2.99));
        g.add_node(3, GpsPoint::new(54.01, -2.995));
        let direct = haversine_distance(&g.node_point(1).unwrap(), &g.node_point(2).unwrap());
        // Direct edge is shorter but penalized
        g.add_edge(
            1,
            2,
            EdgeWeight {
                length_m: direct,
                cost: direct * 10.0,
            },
        );
        g.add_edge(1, 3, EdgeWeight::flat(1_000.0));
        g.add_edge(3, 2, EdgeWeight::flat(1_000.0));
        g.build_index();

        let (nodes, _) = g.shortest_path(1, 2).unwrap();
        assert_eq!(nodes, vec![1, 3, 2]);
    }

    #[test]
    fn test_ascent_penalty_reroutes_around_climb() {
        let mut g = test_graph();
        // Make the 2-3 leg a steep climb; routing 1->3 still has no
        // alternative, but the cost rises while the length does not.
        let mut elevations = HashMap::new();
        elevations.insert(1, 100.0);
        elevations.insert(2, 100.0);
        elevations.insert(3, 600.0);
        elevations.insert(4, 100.0);
        let (_, flat_length) = g.shortest_path(1, 3).unwrap();
        g.apply_ascent_penalty(&elevations, 2.0);
        let (_, penalized_length) = g.shortest_path(1, 3).unwrap();
        assert!((flat_length - penalized_length).abs() < 1e-9);

        let w = g.graph.edge_weight(2, 3).unwrap();
        assert!((w.cost - (w.length_m + 1000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_round_trip_excludes_virtual_nodes() {
        let mut g = test_graph();
        g.snap(&GpsPoint::new(54.45027, -3.215), DEFAULT_SNAP_THRESHOLD_M)
            .unwrap();
        assert_eq!(g.node_count(), 5);

        let snapshot = g.snapshot();
        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.edges.len(), 3);

        let restored = PathGraph::from_snapshot(&snapshot);
        assert_eq!(restored.node_count(), 4);
        let (nodes, _) = restored.shortest_path(1, 3).unwrap();
        assert_eq!(nodes, vec![1, 2, 3]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = test_graph().snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: GraphSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.nodes.len(), 4);
    }
}
