//! Elevation enrichment for GPX tracks.
//!
//! Fetches elevations from a public API (Open-Elevation in batches, USGS
//! point-by-point), fills gaps by linear interpolation, smooths the series to
//! knock GPS noise out of ascent profiles, and sanity-checks the result.

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouteToolError};
use crate::gpx::GpxFile;
use crate::GpsPoint;

/// Open-Elevation lookup endpoint.
pub const OPEN_ELEVATION_URL: &str = "https://api.open-elevation.com/api/v1/lookup";

/// USGS Elevation Point Query Service endpoint.
pub const USGS_EPQS_URL: &str = "https://nationalmap.gov/epqs/pqs.php";

/// Points per Open-Elevation request.
const BATCH_SIZE: usize = 100;

/// Pause between consecutive API requests.
const REQUEST_PAUSE: Duration = Duration::from_millis(100);

/// Which elevation API to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationApi {
    OpenElevation,
    Usgs,
}

/// Smoothing applied to the fetched elevation series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingMethod {
    Gaussian,
    Median,
    MovingAverage,
}

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<LocationQuery>,
}

#[derive(Debug, Serialize)]
struct LocationQuery {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UsgsResponse {
    #[serde(rename = "USGS_Elevation_Point_Query_Service")]
    service: UsgsService,
}

#[derive(Debug, Deserialize)]
struct UsgsService {
    #[serde(rename = "Elevation_Query")]
    query: UsgsQuery,
}

#[derive(Debug, Deserialize)]
struct UsgsQuery {
    #[serde(rename = "Elevation")]
    elevation: Option<f64>,
}

/// Elevation API client.
///
/// A failed batch or point yields `None` entries rather than aborting the
/// run; gaps are interpolated afterwards.
pub struct ElevationFetcher {
    client: reqwest::Client,
    open_elevation_url: String,
    usgs_url: String,
}

impl ElevationFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            open_elevation_url: OPEN_ELEVATION_URL.to_string(),
            usgs_url: USGS_EPQS_URL.to_string(),
        }
    }

    /// Override the API endpoints (used by tests and self-hosted instances).
    pub fn with_urls(client: reqwest::Client, open_elevation_url: &str, usgs_url: &str) -> Self {
        Self {
            client,
            open_elevation_url: open_elevation_url.to_string(),
            usgs_url: usgs_url.to_string(),
        }
    }

    /// Fetch elevations for all points from the selected API.
    pub async fn fetch(&self, api: ElevationApi, points: &[GpsPoint]) -> Vec<Option<f64>> {
        match api {
            ElevationApi::OpenElevation => self.fetch_open_elevation(points).await,
            ElevationApi::Usgs => self.fetch_usgs(points).await,
        }
    }

    async fn fetch_open_elevation(&self, points: &[GpsPoint]) -> Vec<Option<f64>> {
        let mut elevations = Vec::with_capacity(points.len());

        for (batch_index, batch) in points.chunks(BATCH_SIZE).enumerate() {
            match self.fetch_open_elevation_batch(batch).await {
                Ok(batch_elevations) if batch_elevations.len() == batch.len() => {
                    elevations.extend(batch_elevations);
                }
                Ok(batch_elevations) => {
                    warn!(
                        "Open-Elevation batch {} returned {} results for {} points",
                        batch_index + 1,
                        batch_elevations.len(),
                        batch.len()
                    );
                    elevations.extend(std::iter::repeat(None).take(batch.len()));
                }
                Err(err) => {
                    warn!(
                        "Failed to get elevation data for batch {}: {}",
                        batch_index + 1,
                        err
                    );
                    elevations.extend(std::iter::repeat(None).take(batch.len()));
                }
            }
            tokio::time::sleep(REQUEST_PAUSE).await;
        }

        elevations
    }

    async fn fetch_open_elevation_batch(&self, batch: &[GpsPoint]) -> Result<Vec<Option<f64>>> {
        let request = LookupRequest {
            locations: batch
                .iter()
                .map(|p| LocationQuery {
                    latitude: p.latitude,
                    longitude: p.longitude,
                })
                .collect(),
        };

        let response: LookupResponse = self
            .client
            .post(&self.open_elevation_url)
            .json(&request)
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.results.into_iter().map(|r| r.elevation).collect())
    }

    async fn fetch_usgs(&self, points: &[GpsPoint]) -> Vec<Option<f64>> {
        let mut elevations = Vec::with_capacity(points.len());

        for point in points {
            match self.fetch_usgs_point(point).await {
                Ok(elevation) => elevations.push(elevation),
                Err(err) => {
                    warn!(
                        "Failed to get USGS elevation for {}, {}: {}",
                        point.latitude, point.longitude, err
                    );
                    elevations.push(None);
                }
            }
            tokio::time::sleep(REQUEST_PAUSE).await;
        }

        elevations
    }

    async fn fetch_usgs_point(&self, point: &GpsPoint) -> Result<Option<f64>> {
        let response: UsgsResponse = self
            .client
            .get(&self.usgs_url)
            .query(&[
                ("x", point.longitude.to_string()),
                ("y", point.latitude.to_string()),
                ("units", "Meters".to_string()),
                ("output", "json".to_string()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.service.query.elevation)
    }
}

/// Fill missing values by linear interpolation between valid neighbours.
///
/// Leading and trailing gaps take the nearest valid value; an all-missing
/// series becomes zeros.
pub fn interpolate_missing(values: &[Option<f64>]) -> Vec<f64> {
    let valid: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();

    if valid.is_empty() {
        return vec![0.0; values.len()];
    }

    let mut filled = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if let Some(v) = values[i] {
            filled.push(v);
            continue;
        }
        // Nearest valid neighbours either side
        let before = valid.iter().rev().find(|&&(j, _)| j < i);
        let after = valid.iter().find(|&&(j, _)| j > i);
        let value = match (before, after) {
            (Some(&(j0, v0)), Some(&(j1, v1))) => {
                let t = (i - j0) as f64 / (j1 - j0) as f64;
                v0 + t * (v1 - v0)
            }
            (Some(&(_, v0)), None) => v0,
            (None, Some(&(_, v1))) => v1,
            (None, None) => 0.0,
        };
        filled.push(value);
    }
    filled
}

fn window_size(sigma: f64) -> usize {
    let mut size = (sigma * 2.0) as usize + 1;
    if size < 3 {
        size = 3;
    }
    if size % 2 == 0 {
        size += 1;
    }
    size
}

/// Smooth an elevation series.
pub fn smooth(values: &[f64], method: SmoothingMethod, sigma: f64) -> Vec<f64> {
    if values.is_empty() || sigma <= 0.0 {
        return values.to_vec();
    }
    match method {
        SmoothingMethod::Gaussian => gaussian_filter(values, sigma),
        SmoothingMethod::Median => median_filter(values, window_size(sigma)),
        SmoothingMethod::MovingAverage => moving_average(values, window_size(sigma)),
    }
}

fn gaussian_filter(values: &[f64], sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let weights: Vec<f64> = (0..=radius)
        .map(|d| (-((d * d) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();

    let n = values.len();
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let mut sum = 0.0;
        let mut weight_sum = 0.0;
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(n - 1);
        for j in lo..=hi {
            let w = weights[i.abs_diff(j)];
            sum += values[j] * w;
            weight_sum += w;
        }
        smoothed.push(sum / weight_sum);
    }
    smoothed
}

fn median_filter(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    let n = values.len();
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);
        let mut window: Vec<f64> = values[lo..=hi].to_vec();
        window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        smoothed.push(window[window.len() / 2]);
    }
    smoothed
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    let n = values.len();
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);
        let slice = &values[lo..=hi];
        smoothed.push(slice.iter().sum::<f64>() / slice.len() as f64);
    }
    smoothed
}

/// Summary statistics for a fetched elevation series.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationStats {
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub elevation_range: f64,
    pub mean_elevation: f64,
    pub valid_points: usize,
    pub total_points: usize,
    pub data_completeness: f64,
}

/// Result of validating a fetched series.
#[derive(Debug, Clone)]
pub enum Validation {
    Valid(ElevationStats),
    Invalid {
        reason: String,
        stats: Option<ElevationStats>,
    },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

/// Validate a series for plausibility before it is written back.
///
/// Rejects values outside −500..9000 m and series where more than 10% of
/// consecutive steps jump by over 500 m.
pub fn validate(values: &[Option<f64>]) -> Validation {
    let valid: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if valid.is_empty() {
        return Validation::Invalid {
            reason: "No valid elevation data".to_string(),
            stats: None,
        };
    }

    let min = valid.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = valid.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let stats = ElevationStats {
        min_elevation: min,
        max_elevation: max,
        elevation_range: max - min,
        mean_elevation: valid.iter().sum::<f64>() / valid.len() as f64,
        valid_points: valid.len(),
        total_points: values.len(),
        data_completeness: valid.len() as f64 / values.len() as f64,
    };

    if min < -500.0 || max > 9000.0 {
        return Validation::Invalid {
            reason: "Elevation values out of reasonable range".to_string(),
            stats: Some(stats),
        };
    }

    let large_changes = values
        .windows(2)
        .filter(|w| match (w[0], w[1]) {
            (Some(a), Some(b)) => (b - a).abs() > 500.0,
            _ => false,
        })
        .count();

    if large_changes as f64 > values.len() as f64 * 0.1 {
        return Validation::Invalid {
            reason: "Too many large elevation changes".to_string(),
            stats: Some(stats),
        };
    }

    Validation::Valid(stats)
}

/// Per-file summary of an enhancement run.
#[derive(Debug, Default)]
pub struct EnhanceSummary {
    pub segments_processed: usize,
    pub points_processed: usize,
    /// Validation result per segment, keyed "track <i> segment <j>"
    pub validations: Vec<(String, Validation)>,
}

/// Fetch, validate, smooth, and write elevations for every track segment.
pub async fn enhance_gpx(
    gpx: &mut GpxFile,
    fetcher: &ElevationFetcher,
    api: ElevationApi,
    method: SmoothingMethod,
    sigma: f64,
    run_validation: bool,
    input_path: &str,
) -> Result<EnhanceSummary> {
    if !gpx.has_track_points() {
        return Err(RouteToolError::NoTracks {
            path: input_path.to_string(),
        });
    }

    let mut summary = EnhanceSummary::default();

    for (track_index, track) in gpx.tracks.iter_mut().enumerate() {
        for (segment_index, segment) in track.segments.iter_mut().enumerate() {
            if segment.points.is_empty() {
                continue;
            }

            let coordinates: Vec<GpsPoint> = segment.points.iter().map(|p| p.point()).collect();
            info!(
                "Getting elevation data for track {}, segment {} ({} points)",
                track_index + 1,
                segment_index + 1,
                coordinates.len()
            );

            let elevations = fetcher.fetch(api, &coordinates).await;

            if run_validation {
                let validation = validate(&elevations);
                if let Validation::Invalid { reason, .. } = &validation {
                    warn!(
                        "Validation failed for track {}, segment {}: {}",
                        track_index + 1,
                        segment_index + 1,
                        reason
                    );
                }
                summary.validations.push((
                    format!("track {} segment {}", track_index + 1, segment_index + 1),
                    validation,
                ));
            }

            if elevations.iter().any(|e| e.is_some()) {
                let filled = interpolate_missing(&elevations);
                let smoothed = smooth(&filled, method, sigma);
                for (point, elevation) in segment.points.iter_mut().zip(smoothed) {
                    point.elevation = Some(elevation);
                }
                summary.points_processed += segment.points.len();
            }
            summary.segments_processed += 1;
        }
    }

    Ok(summary)
}
