//! The UCP command protocol: typed arguments, the command pattern catalog, validated commands and
//! their JSON wire codec.
pub mod argument;
pub mod codec;
pub mod command;
mod error;
pub mod pattern;

pub use argument::{validate, Argument, ArgumentKind};
pub use codec::{decode, decode_as, encode, Frame, UcpCodec};
pub use command::Command;
pub use error::{ArgumentError, DecodeError, SchemaViolation};
pub use pattern::{pattern_for, CommandKind, Field};
