//! Summit waypoint enrichment from the DoBIH hill database.
//!
//! Waypoints tagged `Summit` that carry a `rr:dobih_number` extension get
//! their coordinates, elevation, and name overwritten from the database.
//! Summits without a number are looked up by name and the candidates are
//! reported so the number can be added to the source file.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::gpx::GpxFile;
use crate::hills::{Hill, HillDb};

/// Maximum number of name-match candidates reported per summit.
pub const MAX_NAME_SUGGESTIONS: usize = 5;

/// Candidate hills for a summit waypoint that has no DoBIH number.
#[derive(Debug, Clone)]
pub struct NameSuggestion {
    /// Name of the waypoint the candidates are for
    pub waypoint_name: String,
    pub candidates: Vec<Hill>,
}

/// Outcome of an enrichment pass.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    /// Summits updated from the database
    pub updated: usize,
    /// Summits that could not be updated, with the reason
    pub warnings: Vec<String>,
    /// Name-lookup candidates for summits missing a DoBIH number
    pub suggestions: Vec<NameSuggestion>,
}

/// Enrich all summit waypoints in place.
pub fn enrich_summits(gpx: &mut GpxFile, db: &HillDb) -> EnrichmentReport {
    let mut report = EnrichmentReport::default();

    for waypoint in gpx.waypoints.iter_mut().filter(|w| w.is_summit()) {
        match waypoint.dobih_number {
            Some(number) => match db.get(number) {
                Some(hill) => {
                    waypoint.latitude = hill.latitude;
                    waypoint.longitude = hill.longitude;
                    waypoint.elevation = Some(hill.metres);
                    waypoint.name = Some(hill.name.clone());
                    report.updated += 1;
                }
                None => {
                    report
                        .warnings
                        .push(format!("DoBIH number {} not found in hill database", number));
                }
            },
            None => match waypoint.name.as_deref() {
                Some(name) => {
                    info!("Looking up summit by name: '{}'", name);
                    let candidates: Vec<Hill> = db
                        .search_by_name(name, MAX_NAME_SUGGESTIONS)
                        .into_iter()
                        .cloned()
                        .collect();
                    if candidates.is_empty() {
                        warn!("No summits found matching name: '{}'", name);
                    } else {
                        report.suggestions.push(NameSuggestion {
                            waypoint_name: name.to_string(),
                            candidates,
                        });
                    }
                    report.warnings.push(format!(
                        "Waypoint '{}' has no DoBIH number; add one from the suggestions",
                        name
                    ));
                }
                None => {
                    report
                        .warnings
                        .push("Waypoint has no name and no DoBIH number".to_string());
                }
            },
        }
    }

    report
}

/// Default output path: the input stem with `_enriched` appended.
pub fn default_enriched_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_enriched.gpx", stem))
}
