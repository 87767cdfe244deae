//! The command pattern catalog: one ordered list of typed fields per command kind.
//!
//! The table is static and read-only. Adding a command kind means adding a variant, its wire tag
//! and its pattern here; construction, encoding and decoding all follow from the pattern.
use super::argument::ArgumentKind;
use super::argument::ArgumentKind::*;

use lazy_static::lazy_static;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Name of the field every request-bearing pattern starts with.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// A named, typed position within a command pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: ArgumentKind,
}

const fn field(name: &'static str, kind: ArgumentKind) -> Field {
    Field { name, kind }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    // Handshake
    Handshake,
    HandshakeAck,
    // Liveness
    Ping,
    Pong,
    // Mining
    MiningSubmit,
    MiningSubmitSuccess,
    MiningSubmitFailure,
    // Transactions
    AdvertiseTransaction,
    // State reports
    BestHeight,
    GetLedgerState,
    LedgerState,
    GetDownloadStatus,
    DownloadStatus,
    // Generic failure reply
    Error,
}

pub const ALL_KINDS: [CommandKind; 14] = [
    CommandKind::Handshake,
    CommandKind::HandshakeAck,
    CommandKind::Ping,
    CommandKind::Pong,
    CommandKind::MiningSubmit,
    CommandKind::MiningSubmitSuccess,
    CommandKind::MiningSubmitFailure,
    CommandKind::AdvertiseTransaction,
    CommandKind::BestHeight,
    CommandKind::GetLedgerState,
    CommandKind::LedgerState,
    CommandKind::GetDownloadStatus,
    CommandKind::DownloadStatus,
    CommandKind::Error,
];

const HANDSHAKE: &[Field] = &[
    field(REQUEST_ID_FIELD, RequestId),
    field("protocol_version", Message),
    field("network", Message),
    field("height", Height),
];
const PING: &[Field] = &[field(REQUEST_ID_FIELD, RequestId), field("timestamp", Timestamp)];
const MINING_SUBMIT: &[Field] = &[
    field(REQUEST_ID_FIELD, RequestId),
    field("job_id", Integer),
    field("n_time", Timestamp),
    field("nonce", Integer),
    field("extra_nonce", Integer),
];
const REQUEST_ONLY: &[Field] = &[field(REQUEST_ID_FIELD, RequestId)];
const REQUEST_AND_REASON: &[Field] = &[field(REQUEST_ID_FIELD, RequestId), field("reason", Message)];
const ADVERTISE_TRANSACTION: &[Field] = &[field("tx_id", Hash), field("raw", Hex)];
const BEST_HEIGHT: &[Field] = &[field("height", Height), field("block_hash", Hash)];
const GET_LEDGER_STATE: &[Field] = &[field(REQUEST_ID_FIELD, RequestId), field("addresses", List)];
const LEDGER_STATE: &[Field] = &[
    field(REQUEST_ID_FIELD, RequestId),
    field("address", Address),
    field("signature_index", Integer),
    field("balance", Integer),
];
const DOWNLOAD_STATUS: &[Field] = &[
    field(REQUEST_ID_FIELD, RequestId),
    field("status", Message),
    field("current_height", Height),
    field("target_height", Height),
];
const ERROR: &[Field] = &[field(REQUEST_ID_FIELD, RequestId), field("message", Message)];

lazy_static! {
    static ref KINDS_BY_NAME: HashMap<&'static str, CommandKind> =
        ALL_KINDS.iter().map(|kind| (kind.name(), *kind)).collect();
}

impl CommandKind {
    /// The wire discriminator of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Handshake => "HANDSHAKE",
            CommandKind::HandshakeAck => "HANDSHAKE_ACK",
            CommandKind::Ping => "PING",
            CommandKind::Pong => "PONG",
            CommandKind::MiningSubmit => "MINING_SUBMIT",
            CommandKind::MiningSubmitSuccess => "MINING_SUBMIT_SUCCESS",
            CommandKind::MiningSubmitFailure => "MINING_SUBMIT_FAILURE",
            CommandKind::AdvertiseTransaction => "ADVERTISE_TRANSACTION",
            CommandKind::BestHeight => "BEST_HEIGHT",
            CommandKind::GetLedgerState => "GET_LEDGER_STATE",
            CommandKind::LedgerState => "LEDGER_STATE",
            CommandKind::GetDownloadStatus => "GET_DOWNLOAD_STATUS",
            CommandKind::DownloadStatus => "DOWNLOAD_STATUS",
            CommandKind::Error => "ERROR",
        }
    }

    pub fn pattern(&self) -> &'static [Field] {
        match self {
            CommandKind::Handshake | CommandKind::HandshakeAck => HANDSHAKE,
            CommandKind::Ping | CommandKind::Pong => PING,
            CommandKind::MiningSubmit => MINING_SUBMIT,
            CommandKind::MiningSubmitSuccess | CommandKind::GetDownloadStatus => REQUEST_ONLY,
            CommandKind::MiningSubmitFailure => REQUEST_AND_REASON,
            CommandKind::AdvertiseTransaction => ADVERTISE_TRANSACTION,
            CommandKind::BestHeight => BEST_HEIGHT,
            CommandKind::GetLedgerState => GET_LEDGER_STATE,
            CommandKind::LedgerState => LEDGER_STATE,
            CommandKind::DownloadStatus => DOWNLOAD_STATUS,
            CommandKind::Error => ERROR,
        }
    }

    /// Whether the pattern carries a request id.
    pub fn request_bearing(&self) -> bool {
        self.pattern().iter().any(|f| f.kind == ArgumentKind::RequestId)
    }

    /// Requests whose sender registers a pending completion.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            CommandKind::Handshake
                | CommandKind::Ping
                | CommandKind::MiningSubmit
                | CommandKind::GetLedgerState
                | CommandKind::GetDownloadStatus
        )
    }

    /// Replies resolve the pending completion registered under their request id.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            CommandKind::HandshakeAck
                | CommandKind::Pong
                | CommandKind::MiningSubmitSuccess
                | CommandKind::MiningSubmitFailure
                | CommandKind::LedgerState
                | CommandKind::DownloadStatus
                | CommandKind::Error
        )
    }

    /// Whether a reply of this kind can complete a `request` of the given kind. `ERROR` answers
    /// any request.
    pub fn answers(&self, request: CommandKind) -> bool {
        match (request, *self) {
            (_, CommandKind::Error) => request.expects_reply(),
            (CommandKind::Handshake, CommandKind::HandshakeAck)
            | (CommandKind::Ping, CommandKind::Pong)
            | (CommandKind::MiningSubmit, CommandKind::MiningSubmitSuccess)
            | (CommandKind::MiningSubmit, CommandKind::MiningSubmitFailure)
            | (CommandKind::GetLedgerState, CommandKind::LedgerState)
            | (CommandKind::GetDownloadStatus, CommandKind::DownloadStatus) => true,
            _ => false,
        }
    }

    /// Replies which complete their request as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, CommandKind::MiningSubmitFailure | CommandKind::Error)
    }

    /// State reports update the sending peer's cached view.
    pub fn is_state_report(&self) -> bool {
        matches!(
            self,
            CommandKind::BestHeight | CommandKind::LedgerState | CommandKind::DownloadStatus
        )
    }
}

/// Returns the ordered field list registered for `kind`.
pub fn pattern_for(kind: CommandKind) -> &'static [Field] {
    kind.pattern()
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CommandKind {
    type Err = super::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KINDS_BY_NAME.get(s).cloned().ok_or_else(|| super::DecodeError::UnknownKind(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_resolve_back() {
        for kind in ALL_KINDS.iter() {
            assert_eq!(kind.name().parse::<CommandKind>().unwrap(), *kind);
        }
        assert!("MINING_SUBMIT_SOMETHING".parse::<CommandKind>().is_err());
    }

    #[test]
    fn test_field_names_are_unique_per_pattern() {
        for kind in ALL_KINDS.iter() {
            let pattern = pattern_for(*kind);
            for (i, f) in pattern.iter().enumerate() {
                assert!(pattern[i + 1..].iter().all(|g| g.name != f.name), "{}", kind);
                assert_ne!(f.name, "command");
            }
        }
    }

    #[test]
    fn test_request_roles_carry_request_ids() {
        for kind in ALL_KINDS.iter() {
            if kind.expects_reply() || kind.is_reply() {
                assert!(kind.request_bearing(), "{}", kind);
                assert_eq!(pattern_for(*kind)[0].name, REQUEST_ID_FIELD);
            }
            if kind.is_failure() {
                assert!(kind.is_reply());
            }
        }
    }

    #[test]
    fn test_every_request_has_an_answer() {
        for request in ALL_KINDS.iter().filter(|kind| kind.expects_reply()) {
            let answers: Vec<_> = ALL_KINDS.iter().filter(|reply| reply.answers(*request)).collect();
            assert!(answers.len() >= 2, "{}", request);
            assert!(answers.iter().all(|reply| reply.is_reply()), "{}", request);
        }
        assert!(CommandKind::LedgerState.answers(CommandKind::GetLedgerState));
        assert!(!CommandKind::LedgerState.answers(CommandKind::MiningSubmit));
        assert!(!CommandKind::Pong.answers(CommandKind::MiningSubmit));
        assert!(!CommandKind::Error.answers(CommandKind::BestHeight));
    }

    #[test]
    fn test_mining_submit_failure_pattern() {
        let pattern = pattern_for(CommandKind::MiningSubmitFailure);
        assert_eq!(
            pattern,
            &[field("request_id", ArgumentKind::RequestId), field("reason", ArgumentKind::Message)]
        );
    }
}
