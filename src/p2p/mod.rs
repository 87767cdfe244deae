pub mod config;
pub mod correlation;
pub mod ledger;
pub mod peer;
pub mod prelude;

// connections feed replies into their `correlation` table and reports into the shared `ledger`
pub mod connection;
// the peer table owns the connections and answers aggregate queries over them
pub mod peer_table;
// the sweeper expires pending requests on behalf of the table
pub mod sweeper;

pub use config::PeerTableConfig;
pub use connection::{InboundCommand, PeerHandle};
pub use correlation::ReplyHandle;
pub use ledger::LedgerContext;
pub use peer::{ConnectionState, Direction, DownloadStatus, PeerSummary};
pub use peer_table::{DownloadStatusResponse, PeerTable, SignedTransaction};
pub use sweeper::Sweeper;
