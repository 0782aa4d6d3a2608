use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use isogate_engine::{GatewayConfig, GenerationId, IsolationGateway, Manifest};

mod cli;
mod error;
mod server;

use cli::CliArgs;
use error::AppError;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let file_appender = tracing_appender::rolling::never(".", "isogate.log");
    let (log_file, _guard) = tracing_appender::non_blocking(file_appender);

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("██╗███████╗ ██████╗  ██████╗  █████╗ ████████╗███████╗");
    info!("██║██╔════╝██╔═══██╗██╔════╝ ██╔══██╗╚══██╔══╝██╔════╝");
    info!("██║███████╗██║   ██║██║  ███╗███████║   ██║   █████╗  ");
    info!("██║╚════██║██║   ██║██║   ██║██╔══██║   ██║   ██╔══╝  ");
    info!("██║███████║╚██████╔╝╚██████╔╝██║  ██║   ██║   ███████╗");
    info!("╚═╝╚══════╝ ╚═════╝  ╚═════╝ ╚═╝  ╚═╝   ╚═╝   ╚══════╝");
    info!("");
    info!("Cross-Origin-Isolation Gateway by hua0512");
    info!("GitHub: https://github.com/hua0512/isogate");
    info!("==================================================================");

    // Load the precache manifest, if one was provided
    let manifest = match &args.manifest {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let manifest = Manifest::from_json(&json)?;
            info!(
                path = %path.display(),
                assets = manifest.precache.len(),
                "loaded precache manifest"
            );
            manifest
        }
        None => Manifest::default(),
    };

    // Log HTTP timeout settings
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s, read={}s",
        args.timeout, args.connect_timeout, args.read_timeout
    );

    let mut builder = GatewayConfig::builder(args.origin.clone())
        .with_entry_path(&args.entry_path)
        .with_generation(GenerationId(args.generation))
        .with_manifest(manifest)
        .with_max_memory_cache_size(args.memory_cache_mb * 1024 * 1024)
        .with_precache_retries(args.precache_retries)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout))
        .with_follow_redirects(!args.no_follow_redirects)
        .with_system_proxy(args.use_system_proxy);

    if let Some(dir) = &args.cache_dir {
        builder = builder.with_cache_root(dir.clone());
    }
    if let Some(scope) = &args.cache_scope {
        builder = builder.with_cache_scope(scope.clone());
    }
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent.clone());
    }
    if let Some(proxy) = args.proxy_config()? {
        info!(proxy = %proxy.url, "using egress proxy for upstream traffic");
        builder = builder.with_proxy(proxy);
    }

    let config = builder.build()?;

    info!(
        origin = %args.origin,
        generation = args.generation,
        "starting isolation gateway"
    );

    let gateway = Arc::new(IsolationGateway::new(config)?);
    gateway.install().await;
    gateway.activate().await;
    if gateway.is_degraded() {
        info!("cache unavailable, serving with header injection only");
    }

    server::serve(gateway, args.origin, args.bind).await
}
