use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use custody_sweeper::config::loader::load_config;
use custody_sweeper::lifecycle::{self, signals, Shutdown};
use custody_sweeper::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "custody-sweeper")]
#[command(about = "Deposit monitoring and treasury sweep engine", long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "CUSTODY_CONFIG", default_value = "custody.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        networks = config.networks.len(),
        assets = config.assets.len(),
        poll_interval_secs = config.engine.poll_interval_secs,
        "custody-sweeper starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let runtime = lifecycle::build(&config)?;
    let shutdown = Shutdown::new();

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = runtime.admin.clone();
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = custody_sweeper::admin::serve(listener, state, shutdown).await {
                tracing::error!(error = %e, "Internal API failed");
            }
        }))
    } else {
        None
    };

    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    runtime.poll_loop.run(shutdown.clone()).await;
    runtime.poll_loop.finish().await;

    shutdown.trigger();
    if let Some(task) = admin_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
