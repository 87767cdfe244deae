//! Validated command instances.
use super::argument::Argument;
use super::error::{ArgumentError, SchemaViolation};
use super::pattern::{CommandKind, Field, REQUEST_ID_FIELD};

/// One command of a registered kind, holding exactly one argument per pattern field.
///
/// A `Command` can only be obtained through [Command::new] or the typed constructors, so any
/// instance in hand is known to match its pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    args: Vec<Argument>,
}

impl Command {
    /// Builds a command from positional arguments, checking them against the pattern of `kind`.
    pub fn new(kind: CommandKind, args: Vec<Argument>) -> Result<Command, SchemaViolation> {
        let pattern = kind.pattern();
        if args.len() != pattern.len() {
            return Err(SchemaViolation::WrongArity {
                kind,
                expected: pattern.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, field)) in args.iter().zip(pattern.iter()).enumerate() {
            if arg.kind() != field.kind {
                return Err(SchemaViolation::WrongKind {
                    kind,
                    index,
                    field: field.name,
                    expected: field.kind,
                    actual: arg.kind(),
                });
            }
        }
        Ok(Command { kind, args })
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// Pairs each pattern field with its argument, in pattern order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static Field, &Argument)> {
        self.kind.pattern().iter().zip(self.args.iter())
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.fields().find(|(f, _)| f.name == name).map(|(_, arg)| arg)
    }

    /// The request id, for kinds whose pattern carries one.
    pub fn request_id(&self) -> Option<u32> {
        match self.get(REQUEST_ID_FIELD) {
            Some(Argument::RequestId(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn message(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Argument::Message(s))
            | Some(Argument::Address(s))
            | Some(Argument::Hash(s))
            | Some(Argument::Hex(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Argument::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn height(&self, name: &str) -> Option<u32> {
        match self.get(name) {
            Some(Argument::Height(h)) => Some(*h),
            _ => None,
        }
    }

    pub fn timestamp(&self, name: &str) -> Option<u64> {
        match self.get(name) {
            Some(Argument::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.get(name) {
            Some(Argument::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// The failure reason carried by failure replies.
    pub fn failure_reason(&self) -> Option<&str> {
        match self.kind {
            CommandKind::MiningSubmitFailure => self.message("reason"),
            CommandKind::Error => self.message("message"),
            _ => None,
        }
    }
}

// Typed constructors. Argument values are validated by the `Argument` constructors; the
// positional layout must match the pattern, which `test_typed_constructors_match_patterns` checks.
impl Command {
    fn build(kind: CommandKind, args: Vec<Argument>) -> Command {
        debug_assert!(Command::new(kind, args.clone()).is_ok(), "{} constructor", kind);
        Command { kind, args }
    }

    pub fn handshake(
        request_id: u32,
        protocol_version: &str,
        network: &str,
        height: u32,
    ) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::Handshake,
            vec![
                Argument::request_id(request_id),
                Argument::message(protocol_version)?,
                Argument::message(network)?,
                Argument::height(height),
            ],
        ))
    }

    pub fn handshake_ack(
        request_id: u32,
        protocol_version: &str,
        network: &str,
        height: u32,
    ) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::HandshakeAck,
            vec![
                Argument::request_id(request_id),
                Argument::message(protocol_version)?,
                Argument::message(network)?,
                Argument::height(height),
            ],
        ))
    }

    pub fn ping(request_id: u32, timestamp: u64) -> Command {
        Command::build(
            CommandKind::Ping,
            vec![Argument::request_id(request_id), Argument::timestamp(timestamp)],
        )
    }

    pub fn pong(request_id: u32, timestamp: u64) -> Command {
        Command::build(
            CommandKind::Pong,
            vec![Argument::request_id(request_id), Argument::timestamp(timestamp)],
        )
    }

    pub fn mining_submit(
        request_id: u32,
        job_id: i64,
        n_time: u64,
        nonce: i64,
        extra_nonce: i64,
    ) -> Command {
        Command::build(
            CommandKind::MiningSubmit,
            vec![
                Argument::request_id(request_id),
                Argument::integer(job_id),
                Argument::timestamp(n_time),
                Argument::integer(nonce),
                Argument::integer(extra_nonce),
            ],
        )
    }

    pub fn mining_submit_success(request_id: u32) -> Command {
        Command::build(CommandKind::MiningSubmitSuccess, vec![Argument::request_id(request_id)])
    }

    pub fn mining_submit_failure(request_id: u32, reason: &str) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::MiningSubmitFailure,
            vec![Argument::request_id(request_id), Argument::message(reason)?],
        ))
    }

    pub fn advertise_transaction(tx_id: &str, raw: &[u8]) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::AdvertiseTransaction,
            vec![Argument::hash(tx_id)?, Argument::hex(raw)?],
        ))
    }

    pub fn best_height(height: u32, block_hash: &str) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::BestHeight,
            vec![Argument::height(height), Argument::hash(block_hash)?],
        ))
    }

    pub fn get_ledger_state(
        request_id: u32,
        addresses: Vec<String>,
    ) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::GetLedgerState,
            vec![Argument::request_id(request_id), Argument::list(addresses)?],
        ))
    }

    pub fn ledger_state(
        request_id: u32,
        address: &str,
        signature_index: i64,
        balance: i64,
    ) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::LedgerState,
            vec![
                Argument::request_id(request_id),
                Argument::address(address)?,
                Argument::integer(signature_index),
                Argument::integer(balance),
            ],
        ))
    }

    pub fn get_download_status(request_id: u32) -> Command {
        Command::build(CommandKind::GetDownloadStatus, vec![Argument::request_id(request_id)])
    }

    pub fn download_status(
        request_id: u32,
        status: &str,
        current_height: u32,
        target_height: u32,
    ) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::DownloadStatus,
            vec![
                Argument::request_id(request_id),
                Argument::message(status)?,
                Argument::height(current_height),
                Argument::height(target_height),
            ],
        ))
    }

    pub fn error(request_id: u32, message: &str) -> Result<Command, ArgumentError> {
        Ok(Command::build(
            CommandKind::Error,
            vec![Argument::request_id(request_id), Argument::message(message)?],
        ))
    }
}
