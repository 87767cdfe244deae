use crate::p2p::PeerTableConfig;
use crate::{Error, Result};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use std::net::SocketAddr;

const ENV_PREFIX: &str = "SPV";

/// On-disk settings of the node. Every member is optional; whatever is missing takes the
/// peer table's default.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub listener_ip: Option<String>,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    pub network: Option<String>,
    pub protocol_version: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub max_message_size: Option<usize>,
    pub max_decode_violations: Option<usize>,
    pub outbound_queue: Option<usize>,
}

impl Settings {
    /// Reads `path` (any format the `config` crate recognises by extension) if given, then
    /// overlays `SPV_*` environment variables.
    pub fn load(path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder.add_source(Environment::with_prefix(ENV_PREFIX)).build()?.try_deserialize()
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()?
            .try_deserialize()
    }

    pub fn peer_table_config(&self) -> Result<PeerTableConfig> {
        let defaults = PeerTableConfig::default();
        let listen_addr = match &self.listener_ip {
            Some(ip) => Some(ip.parse::<SocketAddr>().map_err(|_| Error::PeerParseError)?),
            None => None,
        };
        Ok(PeerTableConfig {
            listen_addr,
            bootstrap_peers: self.bootstrap_peers.clone(),
            network: self.network.clone().unwrap_or(defaults.network),
            protocol_version: self.protocol_version.clone().unwrap_or(defaults.protocol_version),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
            sweep_interval_ms: self.sweep_interval_ms.unwrap_or(defaults.sweep_interval_ms),
            max_message_size: self.max_message_size.unwrap_or(defaults.max_message_size),
            max_decode_violations: self
                .max_decode_violations
                .unwrap_or(defaults.max_decode_violations),
            outbound_queue: self.outbound_queue.unwrap_or(defaults.outbound_queue),
        })
    }
}
