//! Walkable path download from the Overpass API.
//!
//! Queries every OSM way in a bounding box whose `highway` tag is walkable
//! for fell-running purposes and builds a [`PathGraph`] from the response,
//! one edge per consecutive node pair of each way.

use std::collections::HashMap;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

use crate::error::{Result, RouteToolError};
use crate::geo_utils::haversine_distance;
use crate::graph::{EdgeWeight, PathGraph};
use crate::{Bounds, GpsPoint};

/// Public Overpass API endpoint.
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Highway values considered walkable. Quiet roads are included because fell
/// routes regularly follow a lane between paths.
pub const WALKABLE_HIGHWAYS: &str =
    "path|footway|track|bridleway|cycleway|steps|residential|service|unclassified|tertiary|secondary|primary|trunk";

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
    },
    #[serde(other)]
    Other,
}

/// Overpass QL query for walkable ways in `bounds`.
pub fn walkable_query(bounds: &Bounds) -> String {
    format!(
        "[out:json][timeout:180];\
         way[\"highway\"~\"^({highways})$\"]({s},{w},{n},{e});\
         (._;>;);\
         out body;",
        highways = WALKABLE_HIGHWAYS,
        s = bounds.min_lat,
        w = bounds.min_lon,
        n = bounds.max_lat,
        e = bounds.max_lon,
    )
}

/// Build a path graph from an Overpass JSON response.
///
/// Ways referencing nodes absent from the response are skipped at the
/// missing hop; duplicate edges keep the shorter one.
pub fn graph_from_response(json: &str) -> Result<PathGraph> {
    let response: OverpassResponse =
        serde_json::from_str(json).map_err(|err| RouteToolError::Graph {
            message: format!("invalid Overpass response: {}", err),
        })?;

    let mut coords: HashMap<i64, GpsPoint> = HashMap::new();
    let mut ways: Vec<(i64, Vec<i64>)> = Vec::new();
    for element in response.elements {
        match element {
            Element::Node { id, lat, lon } => {
                coords.insert(id, GpsPoint::new(lat, lon));
            }
            Element::Way { id, nodes } => ways.push((id, nodes)),
            Element::Other => {}
        }
    }

    let mut graph = PathGraph::new();
    let mut missing_nodes = 0usize;

    for (way_id, nodes) in &ways {
        for pair in nodes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (Some(pa), Some(pb)) = (coords.get(&a), coords.get(&b)) else {
                missing_nodes += 1;
                continue;
            };
            let length_m = haversine_distance(pa, pb);
            if let Some(existing) = graph.edge_weight(a, b) {
                if existing.length_m <= length_m {
                    continue;
                }
            }
            graph.add_node(a, *pa);
            graph.add_node(b, *pb);
            graph.add_edge(a, b, EdgeWeight::flat(length_m));
        }
        if nodes.len() < 2 {
            warn!("Way {} has fewer than two nodes, skipped", way_id);
        }
    }

    if missing_nodes > 0 {
        warn!(
            "{} way hops referenced nodes missing from the response",
            missing_nodes
        );
    }

    if graph.is_empty() {
        return Err(RouteToolError::Graph {
            message: "no walkable paths found in the requested area".to_string(),
        });
    }

    graph.build_index();
    info!(
        "Built path graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Download the walkable network for `bounds` and build the graph.
pub async fn download_walkable_graph(
    client: &reqwest::Client,
    url: &str,
    bounds: &Bounds,
) -> Result<PathGraph> {
    info!(
        "Downloading walkable paths for bbox ({:.4}, {:.4}) - ({:.4}, {:.4})",
        bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.max_lon
    );

    let body = client
        .post(url)
        .form(&[("data", walkable_query(bounds))])
        .timeout(Duration::from_secs(300))
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    graph_from_response(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESPONSE: &str = r#"{
        "version": 0.6,
        "elements": [
            {"type": "node", "id": 1, "lat": 54.45, "lon": -3.22},
            {"type": "node", "id": 2, "lat": 54.45, "lon": -3.21},
            {"type": "node", "id": 3, "lat": 54.45, "lon": -3.20},
            {"type": "way", "id": 100, "nodes": [1, 2, 3], "tags": {"highway": "path"}},
            {"type": "way", "id": 101, "nodes": [2, 4], "tags": {"highway": "footway"}}
        ]
    }"#;

    #[test]
    fn test_graph_from_response() {
        let graph = graph_from_response(SAMPLE_RESPONSE).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        // Node 4 has no coordinates in the response, so the 2-4 hop is gone
        let (nodes, _) = graph.shortest_path(1, 3).unwrap();
        assert_eq!(nodes, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_response_is_error() {
        let result = graph_from_response(r#"{"elements": []}"#);
        assert!(matches!(result, Err(RouteToolError::Graph { .. })));
    }

    #[test]
    fn test_duplicate_edge_keeps_shorter() {
        let json = r#"{
            "elements": [
                {"type": "node", "id": 1, "lat": 54.45, "lon": -3.22},
                {"type": "node", "id": 2, "lat": 54.45, "lon": -3.21},
                {"type": "way", "id": 100, "nodes": [1, 2]},
                {"type": "way", "id": 101, "nodes": [2, 1]}
            ]
        }"#;
        let graph = graph_from_response(json).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_walkable_query_contains_bbox() {
        let bounds = Bounds {
            min_lat: 54.4,
            max_lat: 54.5,
            min_lon: -3.3,
            max_lon: -3.1,
        };
        let query = walkable_query(&bounds);
        assert!(query.contains("54.4,-3.3,54.5,-3.1"));
        assert!(query.contains("footway"));
        assert!(query.contains("[out:json]"));
    }

    #[test]
    fn test_ignores_unknown_elements() {
        let json = r#"{
            "elements": [
                {"type": "node", "id": 1, "lat": 54.45, "lon": -3.22},
                {"type": "node", "id": 2, "lat": 54.45, "lon": -3.21},
                {"type": "relation", "id": 5, "members": []},
                {"type": "way", "id": 100, "nodes": [1, 2]}
            ]
        }"#;
        let graph = graph_from_response(json).unwrap();
        assert_eq!(graph.node_count(), 2);
    }
}
