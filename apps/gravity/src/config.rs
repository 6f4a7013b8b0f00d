use config::{Config, ConfigError, Environment, File};
use gravity_client::ClientConfig;
use gravity_node::{LruStoreConfig, NodeConfig};
use gravity_transport_websocket::{WebSocketBrokerConfig, WebSocketBusConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GravityConfig {
    pub bus_url: String,
    pub broker_listen: String,
    pub subject_pattern: String,
    pub max_entries: usize,
    pub max_cost: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_seed: Option<String>,
    #[serde(with = "humantime_serde")]
    pub get_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    pub replicas: usize,
    pub dedupe_by_node: bool,
    #[serde(with = "humantime_serde")]
    pub shutdown_poll_interval: Duration,
}

impl GravityConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bus_url", "ws://127.0.0.1:4222")?
            .set_default("broker_listen", "127.0.0.1:4222")?
            .set_default("subject_pattern", "*")?
            .set_default("max_entries", 1_000_000)?
            .set_default("max_cost", 1_i64 << 30)?
            .set_default("node_seed", None::<String>)?
            .set_default("get_timeout", "1s")?
            .set_default("write_timeout", "1s")?
            .set_default("replicas", 1)?
            .set_default("dedupe_by_node", false)?
            .set_default("shutdown_poll_interval", "100ms")?;

        if let Some(path) = config_path {
            if path.extension().and_then(|ext| ext.to_str()) == Some("env") {
                // `.env` files feed the GRAVITY_* environment source below.
                match dotenvy::from_path(&path) {
                    Ok(_) => tracing::info!("loaded environment from {}", path.display()),
                    Err(err) => {
                        tracing::warn!("failed to load .env from {}: {}", path.display(), err)
                    }
                }
            } else {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("GRAVITY").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn bus_config(&self) -> WebSocketBusConfig {
        WebSocketBusConfig::new(self.bus_url.clone())
    }

    pub fn broker_config(&self) -> WebSocketBrokerConfig {
        WebSocketBrokerConfig::new(self.broker_listen.clone())
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            subject_pattern: self.subject_pattern.clone(),
            node_seed: self.node_seed.clone(),
            store: self.store_config(),
        }
    }

    pub fn store_config(&self) -> LruStoreConfig {
        LruStoreConfig {
            max_entries: self.max_entries,
            max_cost: self.max_cost,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            get_timeout: self.get_timeout,
            dedupe_by_node: self.dedupe_by_node,
        }
    }
}
