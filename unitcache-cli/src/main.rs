mod handlers;
mod server;
mod storage;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::server::ServeConfig;
use crate::storage::create_backend;

#[derive(Parser)]
#[command(
    name = "unitcache",
    about = "unitcache: lease cache for data units of pipeline executions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the cache host with its monitoring HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Directory holding execution working directories
        #[arg(long, env = "UNITCACHE_WORKING_DIR")]
        working_dir: PathBuf,

        /// Storage backend: "memory" or "sqlite"
        #[arg(long, default_value = "sqlite", env = "UNITCACHE_STORAGE")]
        storage: String,

        /// Seconds between two sweeps of expired leases
        #[arg(long, default_value = "420", env = "UNITCACHE_SWEEP_INTERVAL_SECS")]
        sweep_interval_secs: u64,

        /// Cold opens allowed to wait on blocking threads at once
        #[arg(long, default_value = "16")]
        max_concurrent_opens: usize,

        /// Bearer token required on lease endpoints
        #[arg(long, env = "UNITCACHE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Check that the repository storage answers (prints OK)
    Probe {
        /// Directory holding execution working directories
        #[arg(long, env = "UNITCACHE_WORKING_DIR")]
        working_dir: PathBuf,

        /// Storage backend: "memory" or "sqlite"
        #[arg(long, default_value = "sqlite", env = "UNITCACHE_STORAGE")]
        storage: String,
    },

    /// Print version information
    Version,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            working_dir,
            storage,
            sweep_interval_secs,
            max_concurrent_opens,
            api_key,
        } => {
            let config = ServeConfig {
                host,
                port,
                working_dir,
                storage,
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                max_concurrent_opens,
                api_key,
            };
            match server::run(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "Server failed");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Probe {
            working_dir,
            storage,
        } => {
            let backend = create_backend(&storage, &working_dir);
            match backend.pool.probe() {
                Ok(()) => {
                    println!("OK");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("probe failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Version => {
            println!("unitcache {}", env!("CARGO_PKG_VERSION"));
            println!("Lease cache for data units of pipeline executions");
            ExitCode::SUCCESS
        }
    }
}
