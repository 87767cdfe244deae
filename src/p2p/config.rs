//! Options the peer table recognises. The table never loads them itself; see
//! [Settings][crate::server::Settings] for the on-disk form used by the node binary.
use crate::ucp::codec::DEFAULT_MAX_MESSAGE_SIZE;

use tokio::time::Duration;

use std::net::SocketAddr;

pub const PROTOCOL_VERSION: &str = "1.0";
pub const DEFAULT_NETWORK: &str = "mainnet";

fn default_network() -> String {
    DEFAULT_NETWORK.to_owned()
}
fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_owned()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_sweep_interval_ms() -> u64 {
    1_000
}
fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}
fn default_max_decode_violations() -> usize {
    10
}
fn default_outbound_queue() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerTableConfig {
    /// Address to accept inbound peers on, if any.
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
    /// Peers dialled on start, as `IP` or `ID@IP`.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Network name exchanged in the handshake; peers on another network are dropped.
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Bound on establishing a connection, handshake included.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Lifetime of a pending request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Period of the pending request sweep.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Malformed commands tolerated before a peer is disconnected; `0` only logs them.
    #[serde(default = "default_max_decode_violations")]
    pub max_decode_violations: usize,
    /// Commands buffered per peer before sends fail with `QueueFull`.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for PeerTableConfig {
    fn default() -> Self {
        PeerTableConfig {
            listen_addr: None,
            bootstrap_peers: vec![],
            network: default_network(),
            protocol_version: default_protocol_version(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_message_size: default_max_message_size(),
            max_decode_violations: default_max_decode_violations(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl PeerTableConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_options_take_defaults() {
        let config: PeerTableConfig =
            serde_json::from_str(r#"{"network": "testnet", "request_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.network, "testnet");
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(config.listen_addr.is_none());
        assert!(config.bootstrap_peers.is_empty());
    }
}
