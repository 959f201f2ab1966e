use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use plugpoll_client::{ReqwestTransport, ShellyParser, TransportOptions};
use plugpoll_core::traits::{MetricsParser, Scraper};
use plugpoll_core::{
    AppError, DEFAULT_SCRAPE_PATH, HttpScraper, Poller, PollerConfig, Target, load_targets,
    retrieve_metrics, scrape_url,
};
use plugpoll_server::{AppState, Registry, routes};

#[derive(Parser)]
#[command(name = "plugpoll", version, about = "Prometheus exporter for Shelly smart plugs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every configured plug and serve the readings to Prometheus
    Serve(ServeArgs),

    /// Query a single plug once and print its readings as JSON
    Probe {
        /// Plug address, optionally with a port
        #[arg(long)]
        host: String,

        /// Status endpoint path
        #[arg(long, default_value = DEFAULT_SCRAPE_PATH)]
        path: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        request_timeout: u64,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Address the metrics server listens on
    #[arg(
        long,
        env = "PLUGPOLL_METRICS_ADDR",
        default_value = "0.0.0.0:9100",
        value_parser = non_empty
    )]
    metrics_addr: String,

    /// Path the metrics are served at
    #[arg(
        long,
        env = "PLUGPOLL_METRICS_PATH",
        default_value = "/metrics",
        value_parser = metrics_path
    )]
    metrics_path: String,

    /// Seconds between polls
    #[arg(
        long,
        env = "PLUGPOLL_POLL_PERIOD",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_period: u64,

    /// JSON file mapping target names to plug addresses
    #[arg(long, env = "PLUGPOLL_TARGETS_FILE", default_value = "./targets.json")]
    targets_config_file: PathBuf,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    request_timeout: u64,

    /// Maximum number of plugs queried at the same time (default: all)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_concurrency: Option<u64>,

    /// Log HTTP connection activity
    #[arg(long, default_value_t = false)]
    verbose_scraper: bool,

    /// Log every successful reading
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("plugpoll=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args).await?,
        Commands::Probe {
            host,
            path,
            request_timeout,
        } => cmd_probe(&host, &path, Duration::from_secs(request_timeout)).await?,
    }

    Ok(())
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    Ok(value.to_string())
}

fn metrics_path(value: &str) -> Result<String, String> {
    if !value.starts_with('/') {
        return Err("must start with '/'".to_string());
    }
    if value == "/health" {
        return Err("'/health' is reserved for the health check".to_string());
    }
    Ok(value.to_string())
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let targets = read_targets(&args.targets_config_file)?;

    let transport = ReqwestTransport::acquire(
        &TransportOptions::default()
            .with_timeout(Duration::from_secs(args.request_timeout))
            .with_verbose(args.verbose_scraper),
    )?;
    let scraper = HttpScraper::new(transport);
    let parser = ShellyParser::new();
    tracing::info!(
        scraper = scraper.version(),
        parser = parser.version(),
        "Initialized scraper and parser"
    );

    let registry = Arc::new(Registry::new()?);
    let config = PollerConfig::default()
        .with_poll_period(Duration::from_secs(args.poll_period))
        .with_verbose_logging(args.verbose)
        .with_max_concurrency(args.max_concurrency.map(|n| n as usize));
    let poller = Arc::new(Poller::new(scraper, parser, Arc::clone(&registry), config));

    for target in &targets {
        registry.add_target(&target.name)?;
        poller
            .add_target(target.name.as_str(), target.hostname.as_str())
            .with_context(|| format!("Failed to add target \"{}\"", target.name))?;
        tracing::info!(target = %target.name, hostname = %target.hostname, "Added target");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(Arc::clone(&poller), shutdown.clone()));

    let listener = TcpListener::bind(&args.metrics_addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.metrics_addr))?;
    let state = Arc::new(AppState { registry });
    let app = routes::router(state, &args.metrics_path).layer(TraceLayer::new_for_http());

    tracing::info!(
        "Serving metrics on http://{}{}",
        args.metrics_addr,
        args.metrics_path
    );
    let server = tokio::spawn({
        let poller = Arc::clone(&poller);
        let shutdown = shutdown.clone();
        async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            // Nothing left to export to once the server is gone.
            poller.stop();
            served
        }
    });

    let polled = poller.run().await;
    shutdown.cancel();
    server
        .await
        .context("Metrics server task failed")?
        .context("Metrics server failed")?;
    polled?;

    tracing::info!("Shut down");
    Ok(())
}

/// Load the targets file, treating every problem with it as a configuration error.
fn read_targets(path: &Path) -> Result<Vec<Target>, AppError> {
    let shown = path.display();
    if !path.exists() {
        let msg = format!("Targets file {shown} does not exist");
        return Err(AppError::Config(msg));
    }
    let targets = load_targets(path)
        .map_err(|e| AppError::Config(format!("Failed to load targets from {shown}: {e}")))?;
    if targets.is_empty() {
        let msg = format!("No targets configured in {shown}");
        return Err(AppError::Config(msg));
    }
    Ok(targets)
}

async fn cmd_probe(host: &str, path: &str, timeout: Duration) -> Result<()> {
    let url = scrape_url(host, path)?;
    let scraper = HttpScraper::new(ReqwestTransport::acquire(
        &TransportOptions::default().with_timeout(timeout),
    )?);

    tracing::info!("Probing {url}");
    let metrics = retrieve_metrics(&scraper, &ShellyParser::new(), url.as_str()).await?;

    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

/// Stop the poller and the server on SIGINT or SIGTERM.
async fn watch_signals<S, P, K>(poller: Arc<Poller<S, P, K>>, shutdown: CancellationToken)
where
    S: Scraper + 'static,
    P: MetricsParser + 'static,
    K: plugpoll_core::MetricsSink + 'static,
{
    tokio::select! {
        () = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            poller.stop();
            shutdown.cancel();
        }
        () = shutdown.cancelled() => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
