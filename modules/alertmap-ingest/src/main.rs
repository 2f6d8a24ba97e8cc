use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alertmap_common::{Config, FeatureCollection};
use alertmap_ingest::geocoding::{
    GeocoderIntersectionResolver, GeocodingRouter, GoogleGeocoder, HttpParcelRegistry,
    NoParcelRegistry, ParcelRegistry, PointGeocoder, StaticTransitStops,
};
use alertmap_ingest::{ClaudeExtractor, IngestDeps, IngestOrchestrator, Submission};
use alertmap_store::{DocumentStore, MemoryStore, PgDocumentStore};

#[derive(Parser)]
#[command(name = "alertmap-ingest", about = "Ingest a civic announcement into alertmap")]
struct Cli {
    /// Announcement text file
    #[arg(long)]
    file: PathBuf,

    /// Page the announcement was crawled from; makes re-ingestion idempotent
    #[arg(long)]
    source_url: Option<String>,

    /// Publisher name
    #[arg(long, default_value = "manual")]
    source: String,

    /// Publisher-supplied FeatureCollection; skips extraction
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// Category for --geojson submissions (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Mark a --geojson submission as affecting the whole locality
    #[arg(long)]
    city_wide: bool,

    /// Use an in-memory store and print the finalized messages
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("alertmap=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    let cli = Cli::parse();

    let config = Config::ingest_from_env();
    config.log_redacted();
    let locality = Arc::new(config.locality()?);

    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let precomputed = match &cli.geojson {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let collection: FeatureCollection = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a GeoJSON FeatureCollection", path.display()))?;
            Some(collection)
        }
        None => None,
    };

    let store: Arc<dyn DocumentStore> = if cli.dry_run {
        info!("Dry run: using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let store = PgDocumentStore::connect(&config.database_url).await?;
        store.migrate().await?;
        Arc::new(store)
    };

    let extractor = ClaudeExtractor::new(
        &config.anthropic_api_key,
        &config.extraction_model,
        &locality.name,
        config.stage_timeout,
    )?;

    let geocoder: Arc<dyn PointGeocoder> = Arc::new(GoogleGeocoder::new(
        &config.google_maps_api_key,
        locality.bounds,
        config.stage_timeout,
    )?);
    let parcels: Arc<dyn ParcelRegistry> = match &config.parcel_registry_url {
        Some(url) => Arc::new(HttpParcelRegistry::new(url, config.stage_timeout)?),
        None => Arc::new(NoParcelRegistry),
    };
    let stops = match &config.transit_stops_path {
        Some(path) => StaticTransitStops::load(path)?,
        None => StaticTransitStops::new(Vec::new()),
    };
    info!(stops = stops.len(), "Transit stops loaded");

    let router = GeocodingRouter::new(
        geocoder.clone(),
        Arc::new(GeocoderIntersectionResolver::new(geocoder)),
        parcels,
        Arc::new(stops),
    )
    .with_timeout(config.stage_timeout)
    .with_concurrency(config.ingest_concurrency);

    let deps = IngestDeps::builder()
        .store(store)
        .extractor(Arc::new(extractor))
        .router(Arc::new(router))
        .locality(locality)
        .stage_timeout(config.stage_timeout)
        .concurrency(config.ingest_concurrency)
        .build();
    let orchestrator = IngestOrchestrator::new(deps);

    let submission = Submission {
        text,
        source: cli.source,
        source_url: cli.source_url,
        crawled_at: chrono::Utc::now(),
        precomputed,
        categories: cli.categories,
        city_wide: cli.city_wide,
    };
    let report = orchestrator.ingest(submission).await?;

    info!(
        source_id = report.source_id.as_str(),
        messages = report.messages.len(),
        "Ingestion complete"
    );
    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&report.messages)?);
    }
    Ok(())
}
