mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gravity_client::{Client, ClientError};
use gravity_node::{LruStore, NodeError, NodeService};
use gravity_transport_websocket::{WebSocketBroker, WebSocketBus, WebSocketBusError};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use thiserror::Error;
use tracing::{error, info};

use crate::config::GravityConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML, or a .env file)
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cache node (default)
    Run,
    /// Run the WebSocket bus broker
    Broker,
    /// Store a value on the cluster
    Set {
        key: String,
        value: String,
        /// Acknowledgments to wait for (defaults to `replicas` from config)
        #[arg(long, short)]
        replicas: Option<usize>,
        /// Deadline in milliseconds (defaults to `write_timeout`)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Read a value from the first node to answer
    Get {
        key: String,
        /// Deadline in milliseconds (defaults to `get_timeout`)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Delete a key
    Del {
        key: String,
        #[arg(long, short)]
        replicas: Option<usize>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Bus(#[from] WebSocketBusError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("render config: {0}")]
    Render(#[from] toml::ser::Error),
}

fn register_shutdown() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let _ = flag::register(SIGTERM, Arc::clone(&shutdown));
    let _ = flag::register(SIGINT, Arc::clone(&shutdown));
    shutdown
}

async fn wait_for_shutdown(shutdown: Arc<AtomicBool>, poll: Duration) {
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(poll).await;
    }
    info!("shutdown requested");
}

async fn connect_bus(config: &GravityConfig) -> Result<Arc<WebSocketBus>, AppError> {
    Ok(Arc::new(WebSocketBus::connect(config.bus_config()).await?))
}

async fn run_node(config: &GravityConfig) -> Result<(), AppError> {
    let shutdown = register_shutdown();
    let bus = connect_bus(config).await?;
    let service = NodeService::new(
        bus,
        LruStore::new(config.store_config()),
        config.node_config(),
    );
    info!(
        node = %service.node_id(),
        bus = %config.bus_url,
        max_entries = config.max_entries,
        max_cost = config.max_cost,
        "starting cache node"
    );
    service
        .run(wait_for_shutdown(shutdown, config.shutdown_poll_interval))
        .await?;
    let stats = service.stats();
    info!(
        received = stats.received,
        replied = stats.replied,
        reply_failed = stats.reply_failed,
        "cache node stopped"
    );
    Ok(())
}

async fn run_broker(config: &GravityConfig) -> Result<(), AppError> {
    let shutdown = register_shutdown();
    let broker = Arc::new(WebSocketBroker::bind(config.broker_config()).await?);
    broker
        .serve(wait_for_shutdown(shutdown, config.shutdown_poll_interval))
        .await;
    Ok(())
}

fn timeout_or(timeout_ms: Option<u64>, default: Duration) -> Duration {
    timeout_ms.map(Duration::from_millis).unwrap_or(default)
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("GRAVITY_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match GravityConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_node(&config).await,
        Commands::Broker => run_broker(&config).await,
        Commands::Config => toml::to_string_pretty(&config)
            .map(|rendered| print!("{rendered}"))
            .map_err(AppError::from),
        Commands::Set {
            key,
            value,
            replicas,
            timeout_ms,
        } => {
            let replicas = replicas.unwrap_or(config.replicas);
            let timeout = timeout_or(timeout_ms, config.write_timeout);
            match connect_bus(&config).await {
                Ok(bus) => Client::new(bus, config.client_config())
                    .set(&key, value.into_bytes(), replicas, timeout)
                    .await
                    .map(|receipt| {
                        for (node, status) in &receipt.acks {
                            println!("{} {:?}", node.short(), status);
                        }
                        println!("acknowledged {}/{}", receipt.acknowledged, replicas);
                    })
                    .map_err(AppError::from),
                Err(err) => Err(err),
            }
        }
        Commands::Del {
            key,
            replicas,
            timeout_ms,
        } => {
            let replicas = replicas.unwrap_or(config.replicas);
            let timeout = timeout_or(timeout_ms, config.write_timeout);
            match connect_bus(&config).await {
                Ok(bus) => Client::new(bus, config.client_config())
                    .delete(&key, replicas, timeout)
                    .await
                    .map(|receipt| println!("acknowledged {}/{}", receipt.acknowledged, replicas))
                    .map_err(AppError::from),
                Err(err) => Err(err),
            }
        }
        Commands::Get { key, timeout_ms } => {
            let timeout = timeout_ms.map(Duration::from_millis);
            match connect_bus(&config).await {
                Ok(bus) => match Client::new(bus, config.client_config())
                    .get(&key, timeout)
                    .await
                {
                    Ok(Some(value)) => {
                        println!("{}", String::from_utf8_lossy(&value));
                        Ok(())
                    }
                    Ok(None) => std::process::exit(3),
                    Err(err) => Err(err.into()),
                },
                Err(err) => Err(err),
            }
        }
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        use clap::Parser;

        // Test 'run' (implicit)
        let cli = Cli::try_parse_from(["gravity"]).expect("parse");
        assert!(cli.command.is_none());

        // Test 'broker' with a config file
        let cli = Cli::try_parse_from(["gravity", "--config", "gravity.toml", "broker"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("gravity.toml")));
        assert!(matches!(cli.command, Some(Commands::Broker)));

        // Test 'set' with overrides
        let cli = Cli::try_parse_from([
            "gravity",
            "set",
            "user-1",
            "hello",
            "--replicas",
            "3",
            "--timeout-ms",
            "500",
        ])
        .expect("parse");
        match cli.command {
            Some(Commands::Set {
                ref key,
                ref value,
                replicas,
                timeout_ms,
            }) => {
                assert_eq!(key, "user-1");
                assert_eq!(value, "hello");
                assert_eq!(replicas, Some(3));
                assert_eq!(timeout_ms, Some(500));
            }
            _ => panic!("expected Set command"),
        }

        // Test 'get' without a timeout
        let cli = Cli::try_parse_from(["gravity", "get", "user-1"]).expect("parse");
        match cli.command {
            Some(Commands::Get { ref key, timeout_ms }) => {
                assert_eq!(key, "user-1");
                assert!(timeout_ms.is_none());
            }
            _ => panic!("expected Get command"),
        }

        let cli = Cli::try_parse_from(["gravity", "del", "user-1", "-r", "2"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Commands::Del {
                replicas: Some(2),
                ..
            })
        ));

        assert!(Cli::try_parse_from(["gravity", "set", "only-key"]).is_err());
    }

    #[test]
    fn timeout_flag_overrides_config() {
        assert_eq!(
            timeout_or(Some(250), Duration::from_secs(1)),
            Duration::from_millis(250)
        );
        assert_eq!(timeout_or(None, Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_future_resolves_once_flag_is_set() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let waiter = tokio::spawn(wait_for_shutdown(
            Arc::clone(&shutdown),
            Duration::from_millis(5),
        ));
        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("resolves promptly")
            .expect("task joins");
    }
}
