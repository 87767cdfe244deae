//! The UCP wire format.
//!
//! A command is a JSON object with a `command` discriminator and one member per pattern field:
//!
//! ```text
//! {"command":"MINING_SUBMIT_FAILURE","request_id":42,"reason":"stale share"}
//! ```
//!
//! Decoding is never trusted: every member is re-validated against the pattern catalog exactly as
//! [Command::new] would, and unknown or missing members are rejected rather than coerced.
//! On a byte stream commands are newline-delimited; [UcpCodec] does the framing.
use super::argument;
use super::command::Command;
use super::error::DecodeError;
use super::pattern::CommandKind;

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{Map, Value};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

/// Name of the member holding the command kind.
pub const DISCRIMINATOR: &str = "command";

/// Default upper bound on a single encoded command.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Serializes `command` as a JSON object.
pub fn encode(command: &Command) -> Vec<u8> {
    let mut object = Map::new();
    object.insert(DISCRIMINATOR.to_owned(), Value::from(command.kind().name()));
    for (field, arg) in command.fields() {
        object.insert(field.name.to_owned(), arg.to_value());
    }
    Value::Object(object).to_string().into_bytes()
}

/// Reconstitutes a command of whatever kind the discriminator names.
pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    let mut object = match value {
        Value::Object(object) => object,
        _ => return Err(DecodeError::NotAnObject),
    };
    let kind = match object.remove(DISCRIMINATOR) {
        Some(Value::String(tag)) => tag.parse::<CommandKind>()?,
        Some(other) => return Err(DecodeError::UnknownKind(other.to_string())),
        None => return Err(DecodeError::MissingDiscriminator),
    };

    let pattern = kind.pattern();
    let mut args = Vec::with_capacity(pattern.len());
    for field in pattern.iter() {
        let raw = object.remove(field.name).ok_or(DecodeError::MissingField(field.name))?;
        let arg = argument::validate(field.kind, &raw)
            .map_err(|error| DecodeError::InvalidField { field: field.name, error })?;
        args.push(arg);
    }
    if let Some(unexpected) = object.keys().next() {
        return Err(DecodeError::UnexpectedField(unexpected.clone()));
    }
    Ok(Command::new(kind, args)?)
}

/// Reconstitutes a command which must be of kind `expected`.
pub fn decode_as(bytes: &[u8], expected: CommandKind) -> Result<Command, DecodeError> {
    let command = decode(bytes)?;
    if command.kind() != expected {
        return Err(DecodeError::UnexpectedKind { expected, actual: command.kind() });
    }
    Ok(command)
}

/// One inbound frame. Malformed frames are surfaced instead of ending the stream so that the
/// connection can apply its violation policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Command(Command),
    Malformed(DecodeError),
}

/// Newline-delimited framing of UCP commands over a byte stream.
#[derive(Debug, Clone)]
pub struct UcpCodec {
    frames: AnyDelimiterCodec,
    max_message_size: usize,
}

impl UcpCodec {
    pub fn new(max_message_size: usize) -> Self {
        UcpCodec {
            frames: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_message_size,
            ),
            max_message_size,
        }
    }

    fn frame(&self, chunk: Bytes) -> Frame {
        match decode(&chunk) {
            Ok(command) => Frame::Command(command),
            Err(err) => Frame::Malformed(err),
        }
    }
}

impl Default for UcpCodec {
    fn default() -> Self {
        UcpCodec::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for UcpCodec {
    type Item = Frame;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> crate::Result<Option<Frame>> {
        loop {
            match self.frames.decode(src) {
                // Blank lines are keep-alives
                Ok(Some(chunk)) if chunk.iter().all(|b| b.is_ascii_whitespace()) => continue,
                Ok(Some(chunk)) => return Ok(Some(self.frame(chunk))),
                Ok(None) => return Ok(None),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    return Ok(Some(Frame::Malformed(DecodeError::TooLarge {
                        max: self.max_message_size,
                    })))
                }
                Err(AnyDelimiterCodecError::Io(err)) => return Err(err.into()),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> crate::Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.iter().all(|b| b.is_ascii_whitespace()) => {
                src.clear();
                Ok(None)
            }
            // A trailing command without its delimiter
            None => {
                let chunk = src.split().freeze();
                Ok(Some(self.frame(chunk)))
            }
        }
    }
}

impl Encoder<Command> for UcpCodec {
    type Error = crate::Error;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> crate::Result<()> {
        let bytes = encode(&command);
        if bytes.len() > self.max_message_size {
            return Err(DecodeError::TooLarge { max: self.max_message_size }.into());
        }
        dst.reserve(bytes.len() + 1);
        dst.put_slice(&bytes);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark_test_util::sample_args;
    use crate::ucp::pattern::ALL_KINDS;
    use crate::ucp::{Argument, ArgumentKind, SchemaViolation};

    #[test]
    fn test_decode_inverts_encode_for_every_kind() {
        for kind in ALL_KINDS.iter() {
            let command = Command::new(*kind, sample_args(*kind)).unwrap();
            assert_eq!(decode(&encode(&command)).unwrap(), command);
            assert_eq!(decode_as(&encode(&command), *kind).unwrap(), command);
        }
    }

    #[test]
    fn test_mining_submit_failure_wire_form() {
        let command = Command::mining_submit_failure(42, "stale share").unwrap();
        let value: Value = serde_json::from_slice(&encode(&command)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "command": "MINING_SUBMIT_FAILURE",
                "request_id": 42,
                "reason": "stale share",
            })
        );
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(matches!(decode(b"{not json"), Err(DecodeError::Malformed(_))));
        assert_eq!(decode(b"[1, 2]"), Err(DecodeError::NotAnObject));
        assert_eq!(decode(br#"{"request_id": 1}"#), Err(DecodeError::MissingDiscriminator));
        assert_eq!(
            decode(br#"{"command": "MINE_HARDER", "request_id": 1}"#),
            Err(DecodeError::UnknownKind("MINE_HARDER".to_string()))
        );
        assert!(matches!(
            decode(br#"{"command": 7, "request_id": 1}"#),
            Err(DecodeError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_and_unexpected_fields() {
        assert_eq!(
            decode(br#"{"command": "MINING_SUBMIT_FAILURE", "request_id": 1}"#),
            Err(DecodeError::MissingField("reason"))
        );
        assert_eq!(
            decode(br#"{"command": "MINING_SUBMIT_SUCCESS", "request_id": 1, "extra": true}"#),
            Err(DecodeError::UnexpectedField("extra".to_string()))
        );
    }

    #[test]
    fn test_decode_never_coerces_field_kinds() {
        let err = decode(br#"{"command": "MINING_SUBMIT_FAILURE", "request_id": "1", "reason": "x"}"#)
            .unwrap_err();
        match err {
            DecodeError::InvalidField { field, error } => {
                assert_eq!(field, "request_id");
                assert_eq!(error.kind, ArgumentKind::RequestId);
            }
            other => panic!("{:?}", other),
        }
        assert!(matches!(
            decode(br#"{"command": "MINING_SUBMIT_FAILURE", "request_id": -4, "reason": "x"}"#),
            Err(DecodeError::InvalidField { field: "request_id", .. })
        ));
    }

    #[test]
    fn test_decode_as_checks_the_kind() {
        let bytes = encode(&Command::mining_submit_success(3));
        assert_eq!(
            decode_as(&bytes, CommandKind::MiningSubmitFailure),
            Err(DecodeError::UnexpectedKind {
                expected: CommandKind::MiningSubmitFailure,
                actual: CommandKind::MiningSubmitSuccess,
            })
        );
    }

    #[test]
    fn test_schema_violation_converts() {
        let violation = Command::new(CommandKind::Pong, vec![Argument::request_id(1)]).unwrap_err();
        assert!(matches!(violation, SchemaViolation::WrongArity { expected: 2, actual: 1, .. }));
        assert!(matches!(DecodeError::from(violation), DecodeError::Schema(_)));
    }

    #[test]
    fn test_codec_frames_commands() {
        let mut codec = UcpCodec::default();
        let mut buf = BytesMut::new();
        let first = Command::ping(1, 100);
        let second = Command::mining_submit_failure(2, "late").unwrap();
        codec.encode(first.clone(), &mut buf).unwrap();
        codec.encode(second.clone(), &mut buf).unwrap();
        buf.put_slice(b"\n{\"command\":\"PING\"}\n");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Command(first)));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Command(second)));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Malformed(DecodeError::MissingField("request_id")))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_codec_skips_oversize_frames() {
        let mut codec = UcpCodec::new(64);
        let mut buf = BytesMut::new();
        buf.put_slice(&vec![b'x'; 200]);
        buf.put_u8(b'\n');
        codec.encode(Command::ping(1, 1), &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Malformed(DecodeError::TooLarge { max: 64 }))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Command(Command::ping(1, 1))));

        let big = Command::mining_submit_failure(1, &"r".repeat(100)).unwrap();
        assert!(codec.encode(big, &mut BytesMut::new()).is_err());
    }
}
