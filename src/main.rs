use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use peerwatch::config::{self, Config};
use peerwatch::error::AppError;
use peerwatch::network::{ConnectionPool, NetworkSession};
use peerwatch::shutdown::ShutdownManager;
use peerwatch::stats::{self, PropagationTracker};
use peerwatch::transport::{resolve_seeds, PoolConfig, TcpPool};

#[derive(Parser, Debug)]
#[command(name = "peerwatch")]
#[command(about = "Watches transaction propagation on the Bitcoin P2P network", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    /// Write the default configuration to --config and exit
    #[arg(long)]
    generate_config: bool,

    #[arg(long)]
    min_peers: Option<usize>,

    #[arg(long)]
    max_peers: Option<usize>,

    /// Do not accept inbound connections
    #[arg(long)]
    no_listen: bool,

    /// host:port to connect to instead of the DNS seeds (repeatable)
    #[arg(long = "seed")]
    seeds: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        match Config::default().save_to_file(&args.config) {
            Ok(()) => {
                println!("✅ Generated default config at: {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("❌ Failed to generate config: {}", e);
                std::process::exit(1);
            }
        }
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = setup_logging(&config.logging, args.verbose);

    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_date = option_env!("BUILD_DATE").unwrap_or("unknown");
    tracing::info!("🚀 peerwatch v{} ({}) built {}", version, git_hash, build_date);

    if let Err(e) = run(config).await {
        tracing::error!("❌ {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<Config, AppError> {
    let mut config = Config::load_or_create(&args.config)?;
    config.apply_env_overrides();

    if let Some(min) = args.min_peers {
        config.network.min_peers = min;
    }
    if let Some(max) = args.max_peers {
        config.network.max_peers = max;
    }
    if args.no_listen {
        config.network.listen = false;
    }
    if !args.seeds.is_empty() {
        config.network.seeds = args.seeds.clone();
    }

    config.network.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<(), AppError> {
    let network = &config.network;
    tracing::info!(
        "📡 magic {:#010x}, peers {}..{}, {}",
        network.magic,
        network.min_peers,
        network.max_peers,
        if network.listen {
            format!("listening on port {}", network.port)
        } else {
            "not listening".to_string()
        }
    );

    let mut shutdown_manager = ShutdownManager::new();
    let shutdown_token = shutdown_manager.token();

    let (pool, pool_events) = TcpPool::new(PoolConfig::from(network));
    let pool: Arc<dyn ConnectionPool> = Arc::new(pool);
    let (mut session, handle) = NetworkSession::new(network.clone(), pool);

    let tracker = PropagationTracker::new(config.stats.max_tracked);
    shutdown_manager.register_task(tokio::spawn(stats::run(
        handle.subscribe(),
        tracker,
        shutdown_token.clone(),
    )));

    let seeds = resolve_seeds(network).await?;
    session.launch(seeds);
    shutdown_manager.register_task(tokio::spawn(session.run(pool_events, shutdown_token)));

    shutdown_manager.wait_for_shutdown().await;
    Ok(())
}

fn setup_logging(config: &config::LoggingConfig, verbose: bool) -> WorkerGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "trace" } else { &config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let short_hostname = hostname.split('.').next().unwrap_or(&hostname).to_string();

    let (writer, guard) = if config.output == "file" {
        let path = std::path::Path::new(&config.file_path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let file = path
            .file_name()
            .map(|f| f.to_os_string())
            .unwrap_or_else(|| "peerwatch.log".into());
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file))
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_thread_ids(false)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(config.output != "file")
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_timer(HostTimer {
                    hostname: short_hostname,
                })
                .compact()
                .init();
        }
    }
    guard
}

/// UTC time and short hostname in front of every line.
struct HostTimer {
    hostname: String,
}

impl tracing_subscriber::fmt::time::FormatTime for HostTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();

        // 2026-03-02 09:14:07.482 [watcher-eu1]  INFO transaction announced tx=...
        write!(
            w,
            "{}.{:03} [{}]",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_millis(),
            self.hostname
        )
    }
}
