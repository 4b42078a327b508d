use clap::Parser;
use pkg_constants::mirroring::{DEFAULT_MAX_ENDPOINTS_PER_SUBSET, DEFAULT_SYNC_INTERVAL_SECS};
use pkg_constants::paths::{DEFAULT_CONTROLLER_CONFIG, DEFAULT_CONTROLLER_DATA_DIR};
use pkg_controllers::endpointslicemirroring::EndpointSliceMirroringController;
use pkg_controllers::endpointslicemirroring::events::TracingEventRecorder;
use pkg_metrics::MetricsRegistry;
use pkg_state::client::StateStore;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "slicemirror-controller",
    about = "Mirrors Endpoints into EndpointSlices"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONTROLLER_CONFIG)]
    config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Maximum number of addresses mirrored per Endpoints subset
    #[arg(long)]
    max_endpoints_per_subset: Option<usize>,

    /// Seconds between mirroring passes
    #[arg(long)]
    sync_interval_secs: Option<u64>,

    /// Log output format: "text" or "json"
    #[arg(long)]
    log_format: Option<String>,
}

fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;

    // Merge: CLI args > config file > defaults
    let log_format = cli
        .log_format
        .or(file_cfg.log_format)
        .unwrap_or_else(|| "text".to_string());
    init_logging(&log_format);

    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_CONTROLLER_DATA_DIR.to_string());
    let max_endpoints_per_subset = cli
        .max_endpoints_per_subset
        .or(file_cfg.max_endpoints_per_subset)
        .unwrap_or(DEFAULT_MAX_ENDPOINTS_PER_SUBSET);
    let sync_interval_secs = cli
        .sync_interval_secs
        .or(file_cfg.sync_interval_secs)
        .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS);

    if max_endpoints_per_subset == 0 {
        anyhow::bail!("max-endpoints-per-subset must be at least 1");
    }
    if sync_interval_secs == 0 {
        anyhow::bail!("sync-interval-secs must be at least 1");
    }

    info!("Starting slicemirror-controller");
    info!("  Config:                    {}", cli.config);
    info!("  Data dir:                  {}", data_dir);
    info!("  Max endpoints per subset:  {}", max_endpoints_per_subset);
    info!("  Sync interval:             {}s", sync_interval_secs);

    let store = StateStore::new(&data_dir).await?;
    let registry = Arc::new(MetricsRegistry::new());

    let controller = EndpointSliceMirroringController::new(
        store.clone(),
        max_endpoints_per_subset,
        Duration::from_secs(sync_interval_secs),
        registry.clone(),
        Arc::new(TracingEventRecorder),
    );
    let handle = controller.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down slicemirror-controller");
    handle.abort();
    let _ = handle.await;
    info!("Final metrics:\n{}", registry.render());

    store.close().await?;
    Ok(())
}
