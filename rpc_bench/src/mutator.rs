//! Call-context mutators.
//!
//! A mutator is a policy applied to the client context before the call is
//! issued, or to the matched slot's server context before the response is
//! sent. The metadata variants isolate metadata-handling overhead from
//! payload-copy overhead: those configurations run with empty payloads.

use cqrpc::{ClientContext, ServerContext};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Metadata value encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Binary-safe values under `-bin` keys.
    Binary,
    /// Text-safe lowercase ascii values.
    Ascii,
}

impl ValueKind {
    fn label(&self) -> &'static str {
        match self {
            ValueKind::Binary => "bin",
            ValueKind::Ascii => "ascii",
        }
    }
}

/// Declarative mutator description; one axis of the configuration matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorSpec {
    /// Leave the context untouched.
    NoOp,
    /// Attach `count` random metadata entries of `value_len` bytes to the
    /// client context.
    ClientMetadata {
        kind: ValueKind,
        value_len: usize,
        count: usize,
    },
    /// Attach `count` random initial-metadata entries of `value_len` bytes
    /// to the server context.
    ServerMetadata {
        kind: ValueKind,
        value_len: usize,
        count: usize,
    },
}

impl MutatorSpec {
    /// Short name used in benchmark identifiers.
    pub fn label(&self) -> String {
        match self {
            MutatorSpec::NoOp => "noop".to_string(),
            MutatorSpec::ClientMetadata {
                kind,
                value_len,
                count,
            } => format!("cli_md_{}_{}x{}", kind.label(), value_len, count),
            MutatorSpec::ServerMetadata {
                kind,
                value_len,
                count,
            } => format!("srv_md_{}_{}x{}", kind.label(), value_len, count),
        }
    }

    /// Instantiate the mutator with its own RNG stream.
    pub fn build(&self, seed: u64) -> Mutator {
        Mutator {
            spec: *self,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

/// Instantiated mutator, applied once per iteration.
pub struct Mutator {
    spec: MutatorSpec,
    rng: SmallRng,
}

impl Mutator {
    /// Apply to the client context before the call is issued.
    pub fn apply_client(&mut self, ctx: &mut ClientContext) {
        if let MutatorSpec::ClientMetadata {
            kind,
            value_len,
            count,
        } = self.spec
        {
            attach(&mut self.rng, kind, value_len, count, |key, value| match value {
                Value::Ascii(v) => ctx.metadata_mut().insert_ascii(key, v),
                Value::Binary(v) => ctx.metadata_mut().insert_binary(key, v),
            });
        }
    }

    /// Apply to the matched slot's server context before the response is
    /// finished.
    pub fn apply_server(&mut self, ctx: &mut ServerContext) {
        if let MutatorSpec::ServerMetadata {
            kind,
            value_len,
            count,
        } = self.spec
        {
            attach(&mut self.rng, kind, value_len, count, |key, value| match value {
                Value::Ascii(v) => ctx.initial_metadata_mut().insert_ascii(key, v),
                Value::Binary(v) => ctx.initial_metadata_mut().insert_binary(key, v),
            });
        }
    }
}

enum Value {
    Ascii(String),
    Binary(Vec<u8>),
}

fn attach(
    rng: &mut SmallRng,
    kind: ValueKind,
    value_len: usize,
    count: usize,
    mut insert: impl FnMut(String, Value),
) {
    for i in 0..count {
        match kind {
            ValueKind::Binary => {
                let value = (0..value_len).map(|_| rng.random::<u8>()).collect();
                insert(format!("k{}-bin", i), Value::Binary(value));
            }
            ValueKind::Ascii => {
                let value = (0..value_len)
                    .map(|_| (b'a' + rng.random_range(0..26u8)) as char)
                    .collect();
                insert(format!("k{}", i), Value::Ascii(value));
            }
        }
    }
}
