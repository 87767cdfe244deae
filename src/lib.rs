#[macro_use]
extern crate serde_derive;
extern crate actix_derive;
extern crate colored;

pub mod benchmark_test_util;
pub mod id;
pub mod p2p;
pub mod server;
pub mod ucp;

use ucp::{ArgumentError, DecodeError, SchemaViolation};

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Json(serde_json::Error),
    Actix(actix::MailboxError),
    Config(config::ConfigError),

    // protocol errors
    Schema(SchemaViolation),
    Decode(DecodeError),
    Argument(ArgumentError),

    // connection errors
    NotConnected,
    /// A peer with the same identity already has a live connection.
    AlreadyConnected(id::Id),
    /// The peer's outbound queue is full.
    QueueFull,
    ConnectionLost,
    HandshakeFailed(String),
    /// The peer answered a request with a failure command (e.g. a rejected submission).
    Rejected(String),

    // correlation errors
    Timeout,
    DuplicateRequest(u32),
    /// Only kinds which expect a reply can be sent as requests.
    NotARequest(ucp::CommandKind),
    /// The reply answered its request but its content could not be used.
    UnusableReply(ucp::CommandKind),

    // peer table errors
    TableClosed,
    UnknownPeer,
    Interrupted,
    ExecutionFailure(String),

    /// Error caused by converting from a `String` to an `Id`
    TryFromStringError,
    /// Error when parsing a peer description `ID@IP`
    PeerParseError,
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json(error)
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::convert::From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl std::convert::From<SchemaViolation> for Error {
    fn from(error: SchemaViolation) -> Self {
        Error::Schema(error)
    }
}

impl std::convert::From<DecodeError> for Error {
    fn from(error: DecodeError) -> Self {
        Error::Decode(error)
    }
}

impl std::convert::From<ArgumentError> for Error {
    fn from(error: ArgumentError) -> Self {
        Error::Argument(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Schema(err) => write!(f, "{}", err),
            Error::Decode(err) => write!(f, "{}", err),
            Error::Argument(err) => write!(f, "{}", err),
            Error::Rejected(reason) => write!(f, "rejected: {}", reason),
            _ => write!(f, "{:?}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
