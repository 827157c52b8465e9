use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};

use fell_routes::cache::{self, GraphCache, DEFAULT_MAX_AGE_DAYS};
use fell_routes::derive::{self, DeriveOptions, DEFAULT_SIMPLIFY_EPSILON};
use fell_routes::elevation::{self, ElevationApi, ElevationFetcher, SmoothingMethod, Validation};
use fell_routes::error::{Result, RouteToolError};
use fell_routes::gpx;
use fell_routes::hills::{HillDb, HILL_ZIP_URL};
use fell_routes::overpass::OVERPASS_URL;
use fell_routes::paths::{self, InferOptions};
use fell_routes::route::{self, RouteOptions};
use fell_routes::summits;
use fell_routes::Bounds;

#[derive(Parser)]
#[command(name = "fell-routes", version, about = "GPX tools for fell-running routes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fix summit waypoints from the DoBIH hill database
    FixSummits(FixSummitsArgs),
    /// Fetch and smooth track elevations from a public elevation API
    EnhanceElevation(EnhanceElevationArgs),
    /// Plot a route between waypoints along walkable OSM paths
    PlotRoute(PlotRouteArgs),
    /// Generate the derivative GPX files for a route
    Derive(DeriveArgs),
    /// Infer unmapped paths from a recorded track
    InferPaths(InferPathsArgs),
}

#[derive(Args)]
struct FixSummitsArgs {
    /// Input GPX file
    input: PathBuf,
    /// Output GPX file (defaults to `<input>_enriched.gpx`)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Local hill database CSV instead of downloading
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ApiChoice {
    OpenElevation,
    Usgs,
}

impl From<ApiChoice> for ElevationApi {
    fn from(choice: ApiChoice) -> Self {
        match choice {
            ApiChoice::OpenElevation => ElevationApi::OpenElevation,
            ApiChoice::Usgs => ElevationApi::Usgs,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SmoothingChoice {
    Gaussian,
    Median,
    MovingAverage,
}

impl From<SmoothingChoice> for SmoothingMethod {
    fn from(choice: SmoothingChoice) -> Self {
        match choice {
            SmoothingChoice::Gaussian => SmoothingMethod::Gaussian,
            SmoothingChoice::Median => SmoothingMethod::Median,
            SmoothingChoice::MovingAverage => SmoothingMethod::MovingAverage,
        }
    }
}

#[derive(Args)]
struct EnhanceElevationArgs {
    /// Input GPX file
    input: PathBuf,
    /// Output GPX file (defaults to `<input>_enhanced.gpx`)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Elevation API to query
    #[arg(long, value_enum, default_value = "open-elevation")]
    api: ApiChoice,
    /// Smoothing method for the fetched series
    #[arg(long, value_enum, default_value = "gaussian")]
    smoothing: SmoothingChoice,
    /// Smoothing strength
    #[arg(long, default_value_t = 2.0)]
    sigma: f64,
    /// Skip plausibility validation of the fetched data
    #[arg(long)]
    no_validate: bool,
}

#[derive(Args)]
struct NetworkArgs {
    /// Overpass API endpoint
    #[arg(long, default_value = OVERPASS_URL)]
    overpass_url: String,
    /// Directory for cached path graphs
    #[arg(long, default_value = ".graph_cache")]
    cache_dir: PathBuf,
    /// Maximum cache entry age in days
    #[arg(long, default_value_t = DEFAULT_MAX_AGE_DAYS)]
    max_age_days: u64,
    /// Redownload the graph even when a fresh cache entry exists
    #[arg(long)]
    force_refresh: bool,
}

#[derive(Args)]
struct PlotRouteArgs {
    /// Input GPX file with the waypoints to route between
    input: PathBuf,
    /// Output GPX file (defaults to `<input>_route.gpx`)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Bounding box buffer around the waypoints, in degrees
    #[arg(long, default_value_t = 0.01)]
    buffer: f64,
    /// Maximum distance a waypoint may sit off the network, in meters
    #[arg(long, default_value_t = 100.0)]
    snap_threshold: f64,
    /// Maximum number of waypoints
    #[arg(long, default_value_t = 50)]
    max_points: usize,
    /// Maximum distance between consecutive waypoints, in km
    #[arg(long, default_value_t = 20.0)]
    max_leg_km: f64,
    #[command(flatten)]
    network: NetworkArgs,
}

#[derive(Args)]
struct DeriveArgs {
    /// Input GPX file
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
    /// File name prefix (defaults to the input file stem)
    #[arg(long)]
    prefix: Option<String>,
    /// Douglas-Peucker tolerance for the simplified track, in degrees
    #[arg(long, default_value_t = DEFAULT_SIMPLIFY_EPSILON)]
    epsilon: f64,
}

#[derive(Args)]
struct InferPathsArgs {
    /// Input GPX file with the recorded track
    input: PathBuf,
    /// Output GPX file for the inferred paths
    #[arg(short, long, default_value = "new_paths.gpx")]
    output: PathBuf,
    /// Distance from mapped paths beyond which a point is off-network, in meters
    #[arg(long, default_value_t = 5.0)]
    tolerance: f64,
    /// Minimum consecutive off-network points per segment
    #[arg(long, default_value_t = 3)]
    min_points: usize,
    /// Bounding box buffer around the track, in degrees
    #[arg(long, default_value_t = 0.01)]
    buffer: f64,
    #[command(flatten)]
    network: NetworkArgs,
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("fell-routes/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(RouteToolError::from)
}

fn with_suffix(input: &PathBuf, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}{}.gpx", stem, suffix))
}

async fn fix_summits(args: FixSummitsArgs) -> Result<()> {
    let db = match &args.csv {
        Some(path) => HillDb::from_csv_path(path)?,
        None => HillDb::download(&http_client()?, HILL_ZIP_URL).await?,
    };
    info!("Hill database loaded: {} hills", db.len());

    let mut file = gpx::read_file(&args.input)?;
    let report = summits::enrich_summits(&mut file, &db);

    for warning in &report.warnings {
        warn!("{}", warning);
    }
    for suggestion in &report.suggestions {
        info!("Candidates for '{}':", suggestion.waypoint_name);
        for hill in &suggestion.candidates {
            info!(
                "  {}: {} ({:.5}, {:.5}) {:.0} m",
                hill.number, hill.name, hill.latitude, hill.longitude, hill.metres
            );
        }
    }

    let output = args
        .output
        .unwrap_or_else(|| summits::default_enriched_path(&args.input));
    gpx::write_file(&output, &file)?;
    info!(
        "Updated {} summit waypoints, wrote {}",
        report.updated,
        output.display()
    );
    Ok(())
}

async fn enhance_elevation(args: EnhanceElevationArgs) -> Result<()> {
    let mut file = gpx::read_file(&args.input)?;
    let fetcher = ElevationFetcher::new(http_client()?);

    let summary = elevation::enhance_gpx(
        &mut file,
        &fetcher,
        args.api.into(),
        args.smoothing.into(),
        args.sigma,
        !args.no_validate,
        &args.input.to_string_lossy(),
    )
    .await?;

    for (label, validation) in &summary.validations {
        if let Validation::Valid(stats) = validation {
            info!(
                "{}: {:.0}-{:.0} m, {:.0}% complete",
                label,
                stats.min_elevation,
                stats.max_elevation,
                stats.data_completeness * 100.0
            );
        }
    }

    let output = args.output.unwrap_or_else(|| with_suffix(&args.input, "_enhanced"));
    gpx::write_file(&output, &file)?;
    info!(
        "Enhanced {} points in {} segments, wrote {}",
        summary.points_processed,
        summary.segments_processed,
        output.display()
    );
    Ok(())
}

async fn obtain_graph(network: &NetworkArgs, bounds: &Bounds) -> Result<fell_routes::graph::PathGraph> {
    let cache = GraphCache::new(&network.cache_dir, network.max_age_days);
    cache::obtain_graph(
        &http_client()?,
        &network.overpass_url,
        &cache,
        bounds,
        network.force_refresh,
    )
    .await
}

async fn plot_route(args: PlotRouteArgs) -> Result<()> {
    let file = gpx::read_file(&args.input)?;
    let options = RouteOptions {
        max_points: args.max_points,
        max_leg_km: args.max_leg_km,
        buffer_degrees: args.buffer,
        snap_threshold_m: args.snap_threshold,
    };
    route::validate_waypoints(&file, &options)?;

    let bounds = route::waypoint_bounds(&file, &options)?;
    let mut graph = obtain_graph(&args.network, &bounds).await?;

    let (output_file, summary) = route::plot_route(&file, &mut graph, &options)?;
    if !summary.skipped.is_empty() {
        warn!("Skipped {} waypoints: {}", summary.skipped.len(), summary.skipped.join(", "));
    }

    let output = args.output.unwrap_or_else(|| with_suffix(&args.input, "_route"));
    gpx::write_file(&output, &output_file)?;
    info!(
        "Route of {:.1} km over {} legs written to {}",
        summary.total_distance_m / 1000.0,
        summary.network_legs + summary.fallback_legs,
        output.display()
    );
    Ok(())
}

fn derive_files(args: DeriveArgs) -> Result<()> {
    let file = gpx::read_file(&args.input)?;
    let prefix = args.prefix.unwrap_or_else(|| {
        args.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "route".to_string())
    });
    let options = DeriveOptions {
        prefix,
        simplify_epsilon: args.epsilon,
    };
    let written = derive::derive_all(&file, &args.out_dir, &options)?;
    for path in &written {
        info!("  {}", path.display());
    }
    Ok(())
}

async fn infer_paths(args: InferPathsArgs) -> Result<()> {
    let file = gpx::read_file(&args.input)?;
    let points = file.track_points();
    let bounds = Bounds::from_points(&points)
        .ok_or_else(|| RouteToolError::NoTracks {
            path: args.input.to_string_lossy().into_owned(),
        })?
        .buffered(args.buffer);

    let graph = obtain_graph(&args.network, &bounds).await?;

    let options = InferOptions {
        tolerance_m: args.tolerance,
        min_segment_points: args.min_points,
        buffer_degrees: args.buffer,
    };
    let (output_file, stats) = paths::infer_new_paths(&file, &graph, &options);
    gpx::write_file(&args.output, &output_file)?;
    info!(
        "{} new path segments written to {}",
        stats.segments,
        args.output.display()
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::FixSummits(args) => fix_summits(args).await,
        Command::EnhanceElevation(args) => enhance_elevation(args).await,
        Command::PlotRoute(args) => plot_route(args).await,
        Command::Derive(args) => derive_files(args),
        Command::InferPaths(args) => infer_paths(args).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
