//! On-disk cache for downloaded path graphs, keyed by bounding box.
//!
//! Each bbox gets one JSON snapshot file named by the SHA-256 of the bbox
//! string. Entries past their age limit are refetched. There is no eviction
//! and no locking; the tools run one at a time.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{info, warn};

use crate::error::{Result, RouteToolError};
use crate::graph::{GraphSnapshot, PathGraph};
use crate::overpass;
use crate::Bounds;

/// Default cache entry lifetime.
pub const DEFAULT_MAX_AGE_DAYS: u64 = 30;

/// Directory of cached graph snapshots.
pub struct GraphCache {
    dir: PathBuf,
    max_age: Duration,
}

impl GraphCache {
    pub fn new(dir: &Path, max_age_days: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            max_age: Duration::from_secs(max_age_days * 24 * 60 * 60),
        }
    }

    /// Path of the cache entry for a bbox.
    pub fn entry_path(&self, bounds: &Bounds) -> PathBuf {
        self.dir.join(format!("graph_{}.json", bounds.cache_key()))
    }

    /// Load a cached graph if a fresh entry exists.
    ///
    /// Returns `None` on a miss or an expired entry. A corrupt entry is
    /// treated as a miss so the next store overwrites it.
    pub fn load(&self, bounds: &Bounds) -> Option<PathGraph> {
        let path = self.entry_path(bounds);
        let metadata = std::fs::metadata(&path).ok()?;

        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())?;
        if age > self.max_age {
            info!(
                "Cached graph {} is {} days old, refetching",
                path.display(),
                age.as_secs() / 86_400
            );
            return None;
        }

        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<GraphSnapshot>(&content) {
            Ok(snapshot) => {
                info!("Loaded cached graph from {}", path.display());
                Some(PathGraph::from_snapshot(&snapshot))
            }
            Err(err) => {
                warn!("Ignoring corrupt cache entry {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Write a graph snapshot to the cache.
    pub fn store(&self, bounds: &Bounds, graph: &PathGraph) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|err| RouteToolError::Cache {
            message: format!("cannot create cache dir {}: {}", self.dir.display(), err),
        })?;

        let path = self.entry_path(bounds);
        let json = serde_json::to_string(&graph.snapshot())?;
        std::fs::write(&path, json).map_err(|err| RouteToolError::Cache {
            message: format!("cannot write {}: {}", path.display(), err),
        })?;
        info!("Cached graph to {}", path.display());
        Ok(path)
    }
}

/// Get the walkable graph for a bbox, from cache when possible.
pub async fn obtain_graph(
    client: &reqwest::Client,
    overpass_url: &str,
    cache: &GraphCache,
    bounds: &Bounds,
    force_refresh: bool,
) -> Result<PathGraph> {
    if !force_refresh {
        if let Some(graph) = cache.load(bounds) {
            return Ok(graph);
        }
    }

    let graph = overpass::download_walkable_graph(client, overpass_url, bounds).await?;
    if let Err(err) = cache.store(bounds, &graph) {
        // A failed cache write must not fail the run
        warn!("Could not cache graph: {}", err);
    }
    Ok(graph)
}
