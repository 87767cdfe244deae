use super::correlation::RequestTable;
use super::ledger::{merge_report, LedgerContext};
use super::prelude::*;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Ready,
    /// Terminal.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Block download progress, either reported by a peer or aggregated over the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Discovering,
    Downloading { current: u32, target: u32 },
    Ready,
}

impl DownloadStatus {
    pub fn name(&self) -> &'static str {
        match self {
            DownloadStatus::Discovering => "DISCOVERING",
            DownloadStatus::Downloading { .. } => "DOWNLOADING",
            DownloadStatus::Ready => "READY",
        }
    }

    /// Interprets the members of a `DOWNLOAD_STATUS` report.
    pub fn from_report(status: &str, current: u32, target: u32) -> Option<DownloadStatus> {
        match status {
            "DISCOVERING" => Some(DownloadStatus::Discovering),
            "DOWNLOADING" => Some(DownloadStatus::Downloading { current, target }),
            "READY" => Some(DownloadStatus::Ready),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DownloadStatus::Downloading { current, target } => {
                write!(f, "{} {}/{}", self.name(), current, target)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Everything known about one connected peer. Guarded by a single lock so that the table reads a
/// peer's height, status and ledger as one snapshot.
pub struct PeerState {
    pub connection_state: ConnectionState,
    pub best_height: Option<u32>,
    pub best_block_hash: Option<String>,
    pub last_seen_at: Instant,
    pub download_status: DownloadStatus,
    pub ledger: HashMap<String, LedgerContext>,
    pub decode_violations: usize,
    pub pending: RequestTable,
}

impl PeerState {
    pub fn new(request_timeout: Duration) -> Self {
        PeerState {
            connection_state: ConnectionState::Connecting,
            best_height: None,
            best_block_hash: None,
            last_seen_at: Instant::now(),
            download_status: DownloadStatus::Discovering,
            ledger: HashMap::new(),
            decode_violations: 0,
            pending: RequestTable::new(request_timeout),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.connection_state == ConnectionState::Ready
    }

    /// Applies a `BEST_HEIGHT`, `LEDGER_STATE` or `DOWNLOAD_STATUS` report. Returns `false` if the
    /// command carries no usable report.
    pub fn apply_report(&mut self, report: &Command) -> bool {
        match report.kind() {
            CommandKind::BestHeight => match report.height("height") {
                Some(height) => {
                    self.best_height = Some(height);
                    self.best_block_hash = report.message("block_hash").map(str::to_owned);
                    true
                }
                None => false,
            },
            CommandKind::LedgerState => match LedgerContext::from_report(report) {
                Some(context) => {
                    let _ = merge_report(&mut self.ledger, context);
                    true
                }
                None => false,
            },
            CommandKind::DownloadStatus => {
                let status = report.message("status");
                let current = report.height("current_height");
                let target = report.height("target_height");
                match (status, current, target) {
                    (Some(status), Some(current), Some(target)) => {
                        match DownloadStatus::from_report(status, current, target) {
                            Some(status) => {
                                self.download_status = status;
                                // A peer at `target` knows the chain at least that far
                                self.best_height = Some(self.best_height.map_or(target, |h| h.max(target)));
                                true
                            }
                            None => false,
                        }
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    pub fn summary(&self, id: Id, addr: SocketAddr, direction: Direction) -> PeerSummary {
        PeerSummary {
            id,
            addr,
            direction,
            state: self.connection_state,
            best_height: self.best_height,
            download_status: self.download_status,
            pending_requests: self.pending.len(),
            decode_violations: self.decode_violations,
            idle: self.last_seen_at.elapsed(),
        }
    }
}

/// Point-in-time copy of a peer, for aggregation and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSummary {
    pub id: Id,
    pub addr: SocketAddr,
    pub direction: Direction,
    pub state: ConnectionState,
    pub best_height: Option<u32>,
    pub download_status: DownloadStatus,
    pub pending_requests: usize,
    pub decode_violations: usize,
    pub idle: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_status_wire_names() {
        assert_eq!(DownloadStatus::from_report("READY", 0, 0), Some(DownloadStatus::Ready));
        assert_eq!(
            DownloadStatus::from_report("DOWNLOADING", 10, 20),
            Some(DownloadStatus::Downloading { current: 10, target: 20 })
        );
        assert_eq!(DownloadStatus::from_report("ready", 0, 0), None);
        assert_eq!(DownloadStatus::Downloading { current: 1, target: 2 }.name(), "DOWNLOADING");
    }

    #[test]
    fn test_reports_update_cached_state() {
        let mut state = PeerState::new(Duration::from_secs(1));
        assert!(state.apply_report(&Command::best_height(120, &"ab".repeat(32)).unwrap()));
        assert_eq!(state.best_height, Some(120));

        assert!(state.apply_report(&Command::download_status(1, "DOWNLOADING", 90, 150).unwrap()));
        assert_eq!(state.download_status, DownloadStatus::Downloading { current: 90, target: 150 });
        assert_eq!(state.best_height, Some(150));

        assert!(state.apply_report(&Command::ledger_state(2, "V5Ujv72h", 4, 1000).unwrap()));
        assert_eq!(state.ledger["V5Ujv72h"].signature_index, 4);

        assert!(!state.apply_report(&Command::download_status(3, "SYNCING", 1, 2).unwrap()));
        assert!(!state.apply_report(&Command::ping(4, 0)));
    }
}
