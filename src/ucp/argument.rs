//! The closed set of typed wire arguments.
//!
//! Every argument carries its kind and a value that already satisfies the kind's rule: the only
//! ways to obtain an [Argument] are the typed constructors and [validate], both of which check the
//! raw value before returning.
use super::error::ArgumentError;

use serde_json::Value;

use std::convert::TryFrom;
use std::fmt;

/// Longest accepted `Message` argument, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;
/// Largest accepted `List` argument, in items.
pub const MAX_LIST_LENGTH: usize = 256;
/// Longest accepted `Address` argument.
pub const MAX_ADDRESS_LENGTH: usize = 64;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    RequestId,
    Message,
    Boolean,
    Integer,
    Height,
    Timestamp,
    Address,
    Hash,
    Hex,
    List,
}

impl ArgumentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArgumentKind::RequestId => "REQUEST_ID",
            ArgumentKind::Message => "MESSAGE",
            ArgumentKind::Boolean => "BOOLEAN",
            ArgumentKind::Integer => "INTEGER",
            ArgumentKind::Height => "HEIGHT",
            ArgumentKind::Timestamp => "TIMESTAMP",
            ArgumentKind::Address => "ADDRESS",
            ArgumentKind::Hash => "HASH",
            ArgumentKind::Hex => "HEX",
            ArgumentKind::List => "LIST",
        }
    }
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    RequestId(u32),
    Message(String),
    Boolean(bool),
    Integer(i64),
    Height(u32),
    Timestamp(u64),
    Address(String),
    Hash(String),
    Hex(String),
    List(Vec<String>),
}

impl Argument {
    pub fn kind(&self) -> ArgumentKind {
        match self {
            Argument::RequestId(_) => ArgumentKind::RequestId,
            Argument::Message(_) => ArgumentKind::Message,
            Argument::Boolean(_) => ArgumentKind::Boolean,
            Argument::Integer(_) => ArgumentKind::Integer,
            Argument::Height(_) => ArgumentKind::Height,
            Argument::Timestamp(_) => ArgumentKind::Timestamp,
            Argument::Address(_) => ArgumentKind::Address,
            Argument::Hash(_) => ArgumentKind::Hash,
            Argument::Hex(_) => ArgumentKind::Hex,
            Argument::List(_) => ArgumentKind::List,
        }
    }

    pub fn request_id(id: u32) -> Argument {
        Argument::RequestId(id)
    }

    pub fn message(message: impl Into<String>) -> Result<Argument, ArgumentError> {
        let message = message.into();
        check_message(ArgumentKind::Message, &message)?;
        Ok(Argument::Message(message))
    }

    pub fn boolean(b: bool) -> Argument {
        Argument::Boolean(b)
    }

    pub fn integer(n: i64) -> Argument {
        Argument::Integer(n)
    }

    pub fn height(height: u32) -> Argument {
        Argument::Height(height)
    }

    pub fn timestamp(secs: u64) -> Argument {
        Argument::Timestamp(secs)
    }

    pub fn address(address: impl Into<String>) -> Result<Argument, ArgumentError> {
        let address = address.into();
        check_address(&address)?;
        Ok(Argument::Address(address))
    }

    pub fn hash(hash: impl Into<String>) -> Result<Argument, ArgumentError> {
        let hash = hash.into();
        check_hash(&hash)?;
        Ok(Argument::Hash(hash))
    }

    pub fn hex(bytes: &[u8]) -> Result<Argument, ArgumentError> {
        let encoded = hex::encode(bytes);
        check_hex(&encoded)?;
        Ok(Argument::Hex(encoded))
    }

    pub fn list(items: Vec<String>) -> Result<Argument, ArgumentError> {
        check_list(&items)?;
        Ok(Argument::List(items))
    }

    /// The JSON form of this argument.
    pub fn to_value(&self) -> Value {
        match self {
            Argument::RequestId(id) => Value::from(*id),
            Argument::Message(s) | Argument::Address(s) | Argument::Hash(s) | Argument::Hex(s) => {
                Value::from(s.as_str())
            }
            Argument::Boolean(b) => Value::from(*b),
            Argument::Integer(n) => Value::from(*n),
            Argument::Height(h) => Value::from(*h),
            Argument::Timestamp(t) => Value::from(*t),
            Argument::List(items) => {
                Value::Array(items.iter().map(|s| Value::from(s.as_str())).collect())
            }
        }
    }
}

/// Validates a raw JSON value against `kind`, producing a typed argument.
pub fn validate(kind: ArgumentKind, raw: &Value) -> Result<Argument, ArgumentError> {
    match kind {
        ArgumentKind::RequestId => {
            let n = as_unsigned(kind, raw)?;
            let id = u32::try_from(n)
                .map_err(|_| ArgumentError::new(kind, format!("{} is out of range", n)))?;
            Ok(Argument::RequestId(id))
        }
        ArgumentKind::Height => {
            let n = as_unsigned(kind, raw)?;
            let height = u32::try_from(n)
                .map_err(|_| ArgumentError::new(kind, format!("{} is out of range", n)))?;
            Ok(Argument::Height(height))
        }
        ArgumentKind::Timestamp => Ok(Argument::Timestamp(as_unsigned(kind, raw)?)),
        ArgumentKind::Integer => match raw.as_i64() {
            Some(n) => Ok(Argument::Integer(n)),
            None => Err(ArgumentError::new(kind, format!("expected an integer, got {}", raw))),
        },
        ArgumentKind::Boolean => match raw.as_bool() {
            Some(b) => Ok(Argument::Boolean(b)),
            None => Err(ArgumentError::new(kind, format!("expected a boolean, got {}", raw))),
        },
        ArgumentKind::Message => {
            let s = as_str(kind, raw)?;
            check_message(kind, s)?;
            Ok(Argument::Message(s.to_owned()))
        }
        ArgumentKind::Address => {
            let s = as_str(kind, raw)?;
            check_address(s)?;
            Ok(Argument::Address(s.to_owned()))
        }
        ArgumentKind::Hash => {
            let s = as_str(kind, raw)?;
            check_hash(s)?;
            Ok(Argument::Hash(s.to_owned()))
        }
        ArgumentKind::Hex => {
            let s = as_str(kind, raw)?;
            check_hex(s)?;
            Ok(Argument::Hex(s.to_owned()))
        }
        ArgumentKind::List => {
            let values = raw.as_array().ok_or_else(|| {
                ArgumentError::new(kind, format!("expected an array, got {}", raw))
            })?;
            let mut items = Vec::with_capacity(values.len());
            for value in values.iter() {
                items.push(as_str(kind, value)?.to_owned());
            }
            check_list(&items)?;
            Ok(Argument::List(items))
        }
    }
}

fn as_unsigned(kind: ArgumentKind, raw: &Value) -> Result<u64, ArgumentError> {
    raw.as_u64().ok_or_else(|| {
        ArgumentError::new(kind, format!("expected a non-negative integer, got {}", raw))
    })
}

fn as_str(kind: ArgumentKind, raw: &Value) -> Result<&str, ArgumentError> {
    raw.as_str().ok_or_else(|| ArgumentError::new(kind, format!("expected a string, got {}", raw)))
}

fn check_message(kind: ArgumentKind, s: &str) -> Result<(), ArgumentError> {
    let len = s.chars().count();
    if len > MAX_MESSAGE_LENGTH {
        return Err(ArgumentError::new(
            kind,
            format!("{} characters exceeds the limit of {}", len, MAX_MESSAGE_LENGTH),
        ));
    }
    Ok(())
}

fn check_address(s: &str) -> Result<(), ArgumentError> {
    let kind = ArgumentKind::Address;
    if s.is_empty() || s.len() > MAX_ADDRESS_LENGTH {
        return Err(ArgumentError::new(kind, format!("length {} is out of range", s.len())));
    }
    if let Some(c) = s.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(ArgumentError::new(kind, format!("`{}` is not a base58 character", c)));
    }
    Ok(())
}

fn check_hash(s: &str) -> Result<(), ArgumentError> {
    let kind = ArgumentKind::Hash;
    if s.len() != 64 {
        return Err(ArgumentError::new(kind, format!("expected 64 hex digits, got {}", s.len())));
    }
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ArgumentError::new(kind, "not a hex string"));
    }
    Ok(())
}

fn check_hex(s: &str) -> Result<(), ArgumentError> {
    let kind = ArgumentKind::Hex;
    if s.len() % 2 != 0 {
        return Err(ArgumentError::new(kind, "odd number of hex digits"));
    }
    if s.len() > 2 * MAX_MESSAGE_LENGTH {
        return Err(ArgumentError::new(kind, format!("{} hex digits is too long", s.len())));
    }
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ArgumentError::new(kind, "not a hex string"));
    }
    Ok(())
}

fn check_list(items: &[String]) -> Result<(), ArgumentError> {
    let kind = ArgumentKind::List;
    if items.len() > MAX_LIST_LENGTH {
        return Err(ArgumentError::new(
            kind,
            format!("{} items exceeds the limit of {}", items.len(), MAX_LIST_LENGTH),
        ));
    }
    for item in items.iter() {
        check_message(kind, item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_must_be_non_negative() {
        assert_eq!(validate(ArgumentKind::RequestId, &json!(42)), Ok(Argument::RequestId(42)));
        assert!(validate(ArgumentKind::RequestId, &json!(-1)).is_err());
        assert!(validate(ArgumentKind::RequestId, &json!(1.5)).is_err());
        assert!(validate(ArgumentKind::RequestId, &json!("42")).is_err());
        assert!(validate(ArgumentKind::RequestId, &json!(u64::from(u32::MAX) + 1)).is_err());
    }

    #[test]
    fn test_message_is_bounded() {
        let ok = "x".repeat(MAX_MESSAGE_LENGTH);
        assert!(validate(ArgumentKind::Message, &json!(ok)).is_ok());
        let too_long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        let err = validate(ArgumentKind::Message, &json!(too_long)).unwrap_err();
        assert_eq!(err.kind, ArgumentKind::Message);
        assert!(Argument::message(too_long).is_err());
    }

    #[test]
    fn test_no_coercion_between_kinds() {
        assert!(validate(ArgumentKind::Integer, &json!("7")).is_err());
        assert!(validate(ArgumentKind::Boolean, &json!(1)).is_err());
        assert!(validate(ArgumentKind::Message, &json!(7)).is_err());
        assert!(validate(ArgumentKind::List, &json!(["a", 1])).is_err());
    }

    #[test]
    fn test_address_hash_and_hex_rules() {
        assert!(Argument::address("V5Ujv72h4jEBcKnALGc4fKqs6CDAPX").is_ok());
        assert!(Argument::address("").is_err());
        assert!(Argument::address("0OIl").is_err());

        assert!(Argument::hash("ab".repeat(32)).is_ok());
        assert!(Argument::hash("ab".repeat(31)).is_err());
        assert!(Argument::hash("zz".repeat(32)).is_err());

        assert_eq!(Argument::hex(&[0xde, 0xad]).unwrap(), Argument::Hex("dead".to_string()));
        assert!(validate(ArgumentKind::Hex, &json!("abc")).is_err());
    }

    #[test]
    fn test_value_form_validates_back() {
        let args = vec![
            Argument::request_id(7),
            Argument::message("hello").unwrap(),
            Argument::boolean(true),
            Argument::integer(-3),
            Argument::height(250),
            Argument::timestamp(1_600_000_000),
            Argument::list(vec!["a".to_string(), "b".to_string()]).unwrap(),
        ];
        for arg in args.iter() {
            assert_eq!(&validate(arg.kind(), &arg.to_value()).unwrap(), arg);
        }
    }
}
