//! Declarative benchmark configuration matrix.
//!
//! Each configuration is data: a transport, two mutators, and a payload
//! size pair. The matrix is built by iteration at setup rather than by
//! per-combination code.

use crate::fixture::Transport;
use crate::mutator::{MutatorSpec, ValueKind};

/// Default upper bound for the payload size sweep (128 MiB).
pub const DEFAULT_SWEEP_LIMIT: u64 = 128 * 1024 * 1024;

/// Sizes for one sweep axis: the zero baseline plus powers of 8 up to and
/// including `limit`.
pub fn sweep_sizes(limit: u64) -> Vec<u64> {
    let mut sizes = vec![0];
    let mut size: u64 = 1;
    while size <= limit {
        sizes.push(size);
        match size.checked_mul(8) {
            Some(next) => size = next,
            None => break,
        }
    }
    sizes
}

/// Request/response size pairs for a sweep configuration: `(0,0)` plus
/// `(s,0)`, `(0,s)`, `(s,s)` for every nonzero sweep size.
pub fn sweep_pairs(limit: u64) -> Vec<(u64, u64)> {
    let mut pairs = vec![(0, 0)];
    for &s in sweep_sizes(limit).iter().filter(|&&s| s != 0) {
        pairs.push((s, 0));
        pairs.push((0, s));
        pairs.push((s, s));
    }
    pairs
}

/// One benchmark configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub transport: Transport,
    pub client_mutator: MutatorSpec,
    pub server_mutator: MutatorSpec,
    pub request_size: usize,
    pub response_size: usize,
}

impl BenchConfig {
    fn new(
        transport: Transport,
        client_mutator: MutatorSpec,
        server_mutator: MutatorSpec,
        request_size: u64,
        response_size: u64,
    ) -> Self {
        Self {
            transport,
            client_mutator,
            server_mutator,
            request_size: request_size as usize,
            response_size: response_size as usize,
        }
    }

    /// Stable benchmark identifier, used for filtering and reporting.
    pub fn name(&self) -> String {
        format!(
            "unary_ping_pong/{}/{}/{}/{}x{}",
            self.transport.label(),
            self.client_mutator.label(),
            self.server_mutator.label(),
            self.request_size,
            self.response_size
        )
    }
}

const METADATA_VALUE_LENS: [usize; 3] = [10, 31, 100];

/// The full benchmark matrix.
///
/// Payload sweeps run on the transports where payload copy cost is the
/// interesting axis; single-connection-setup transports pin `(0,0)`.
/// Metadata variants run on the in-process transport with empty payloads
/// so metadata handling is the only moving part.
pub fn benchmarks(sweep_limit: u64) -> Vec<BenchConfig> {
    let mut configs = Vec::new();

    for &(a, b) in &sweep_pairs(sweep_limit) {
        configs.push(BenchConfig::new(
            Transport::Tcp,
            MutatorSpec::NoOp,
            MutatorSpec::NoOp,
            a,
            b,
        ));
    }
    configs.push(BenchConfig::new(
        Transport::Uds,
        MutatorSpec::NoOp,
        MutatorSpec::NoOp,
        0,
        0,
    ));
    for &(a, b) in &sweep_pairs(sweep_limit) {
        configs.push(BenchConfig::new(
            Transport::InProcess,
            MutatorSpec::NoOp,
            MutatorSpec::NoOp,
            a,
            b,
        ));
    }
    configs.push(BenchConfig::new(
        Transport::SockPair,
        MutatorSpec::NoOp,
        MutatorSpec::NoOp,
        0,
        0,
    ));

    for &value_len in &METADATA_VALUE_LENS {
        for count in [1, 2] {
            configs.push(BenchConfig::new(
                Transport::InProcess,
                MutatorSpec::ClientMetadata {
                    kind: ValueKind::Binary,
                    value_len,
                    count,
                },
                MutatorSpec::NoOp,
                0,
                0,
            ));
        }
    }
    for &value_len in &METADATA_VALUE_LENS {
        configs.push(BenchConfig::new(
            Transport::InProcess,
            MutatorSpec::NoOp,
            MutatorSpec::ServerMetadata {
                kind: ValueKind::Binary,
                value_len,
                count: 1,
            },
            0,
            0,
        ));
    }
    for &value_len in &METADATA_VALUE_LENS {
        configs.push(BenchConfig::new(
            Transport::InProcess,
            MutatorSpec::ClientMetadata {
                kind: ValueKind::Ascii,
                value_len,
                count: 1,
            },
            MutatorSpec::NoOp,
            0,
            0,
        ));
    }
    for &value_len in &METADATA_VALUE_LENS {
        configs.push(BenchConfig::new(
            Transport::InProcess,
            MutatorSpec::NoOp,
            MutatorSpec::ServerMetadata {
                kind: ValueKind::Ascii,
                value_len,
                count: 1,
            },
            0,
            0,
        ));
    }
    configs.push(BenchConfig::new(
        Transport::InProcess,
        MutatorSpec::NoOp,
        MutatorSpec::ServerMetadata {
            kind: ValueKind::Ascii,
            value_len: 10,
            count: 100,
        },
        0,
        0,
    ));

    configs
}
