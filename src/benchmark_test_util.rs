//! Fixtures shared by unit tests and benchmarks.
use crate::ucp::{Argument, ArgumentKind, CommandKind};

/// A conforming argument list for `kind`, used by tests and benchmarks.
pub fn sample_args(kind: CommandKind) -> Vec<Argument> {
    kind.pattern()
        .iter()
        .map(|field| match field.kind {
            ArgumentKind::RequestId => Argument::RequestId(17),
            ArgumentKind::Message => Argument::Message("sample".to_string()),
            ArgumentKind::Boolean => Argument::Boolean(true),
            ArgumentKind::Integer => Argument::Integer(-5),
            ArgumentKind::Height => Argument::Height(1200),
            ArgumentKind::Timestamp => Argument::Timestamp(1_600_000_000),
            ArgumentKind::Address => Argument::Address("V5Ujv72h4jEBcKnALGc4fKqs6CDAPX".to_string()),
            ArgumentKind::Hash => Argument::Hash("0f".repeat(32)),
            ArgumentKind::Hex => Argument::Hex("c0ffee".to_string()),
            ArgumentKind::List => Argument::List(vec!["one".to_string(), "two".to_string()]),
        })
        .collect()
}
