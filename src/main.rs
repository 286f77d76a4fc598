//! Transaction coordinator server entry point.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use tx_coordinator::config::ServerConfig;
use tx_coordinator::coordinator::{run_reconciliation_loops, Coordinator};
use tx_coordinator::events::EventBus;
use tx_coordinator::rpc::build_router;
use tx_coordinator::storage::MemoryStore;

const CONFIG_PATH_ENV: &str = "TC_CONFIG_PATH";

struct Args {
    config_path: Option<PathBuf>,
    worker_id: Option<i64>,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        worker_id: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "-c" | "--config" => args.config_path = iter.next().map(PathBuf::from),
            "-n" | "--server-node" => {
                args.worker_id = iter.next().and_then(|v| v.parse().ok());
            }
            other => {
                eprintln!("unrecognized argument: {other}");
            }
        }
    }
    args
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let args = parse_args();
    let config_path = args
        .config_path
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

    let mut config = match &config_path {
        Some(path) => ServerConfig::load(path)?,
        None => {
            info!("no -c config file given and {CONFIG_PATH_ENV} unset; using defaults");
            ServerConfig::default()
        }
    };
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }

    info!(listen_addr = %config.listen_addr, "starting transaction coordinator");

    let store = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(Coordinator::new(store, config.clone(), EventBus::noop()));
    run_reconciliation_loops(coordinator.clone());

    let router = build_router(coordinator);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "transaction coordinator listening");

    if let Err(err) = axum::serve(listener, router).await {
        error!(%err, "server exited with error");
        return Err(err.into());
    }

    Ok(())
}
