//! Errors raised while building or decoding UCP commands.
use super::argument::ArgumentKind;
use super::pattern::CommandKind;

use derive_more::Display;

/// A raw value does not satisfy the rule of its argument kind.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display(fmt = "invalid {} argument: {}", kind, reason)]
pub struct ArgumentError {
    pub kind: ArgumentKind,
    pub reason: String,
}

impl ArgumentError {
    pub fn new(kind: ArgumentKind, reason: impl Into<String>) -> Self {
        ArgumentError { kind, reason: reason.into() }
    }
}

impl std::error::Error for ArgumentError {}

/// An argument list does not match the pattern registered for a command kind.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[display(fmt = "{} takes exactly {} arguments, got {}", kind, expected, actual)]
    WrongArity { kind: CommandKind, expected: usize, actual: usize },
    #[display(
        fmt = "{} argument {} (`{}`) must be a {}, got a {}",
        kind,
        index,
        field,
        expected,
        actual
    )]
    WrongKind {
        kind: CommandKind,
        index: usize,
        field: &'static str,
        expected: ArgumentKind,
        actual: ArgumentKind,
    },
}

impl std::error::Error for SchemaViolation {}

/// Wire bytes could not be reconstituted into a command.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[display(fmt = "malformed command: {}", _0)]
    Malformed(String),
    #[display(fmt = "command is not an object")]
    NotAnObject,
    #[display(fmt = "command discriminator is missing")]
    MissingDiscriminator,
    #[display(fmt = "unknown command `{}`", _0)]
    UnknownKind(String),
    #[display(fmt = "expected a {} command, got {}", expected, actual)]
    UnexpectedKind { expected: CommandKind, actual: CommandKind },
    #[display(fmt = "missing field `{}`", _0)]
    MissingField(&'static str),
    #[display(fmt = "unexpected field `{}`", _0)]
    UnexpectedField(String),
    #[display(fmt = "field `{}`: {}", field, error)]
    InvalidField { field: &'static str, error: ArgumentError },
    #[display(fmt = "{}", _0)]
    Schema(SchemaViolation),
    #[display(fmt = "command exceeds the {} byte limit", max)]
    TooLarge { max: usize },
}

impl std::error::Error for DecodeError {}

impl From<SchemaViolation> for DecodeError {
    fn from(violation: SchemaViolation) -> Self {
        DecodeError::Schema(violation)
    }
}
