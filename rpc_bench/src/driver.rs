//! Call lifecycle state machine and iteration driver.
//!
//! One iteration: issue the client call, wait for exactly one accept
//! completion (either slot may match; dispatch is by decoded tag only),
//! issue both finish operations without blocking in between, drain the two
//! finish completions in whichever order they arrive, verify success, and
//! re-arm the consumed slot before the iteration counts as done.
//!
//! Transport precondition: at most one operation per slot is in flight at
//! a time. Both slots are armed before the client call exists, and the
//! consumed slot is re-armed only after its finishes drained, so the
//! two-tag drain mask can never observe a stray accept for a later
//! iteration. The drain logic relies on this and does not generalize.

use std::time::{Duration, Instant};

use cqrpc::{ClientContext, Completion, CompletionQueue, Config, Status};

use crate::error::{BenchError, Result};
use crate::fixture::Fixture;
use crate::matrix::BenchConfig;
use crate::mutator::Mutator;
use crate::slot::SlotPool;
use crate::tag::{BenchTag, TagMask, TAG_CLIENT_FINISH, TAG_SERVER_FINISH};

/// An expected completion missing for this long is a harness defect.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Iteration and time budget for one configuration.
#[derive(Debug, Clone)]
pub struct RunBudget {
    /// Untimed warmup iterations.
    pub warmup: u64,
    /// Timed iterations.
    pub iterations: u64,
    /// Optional wall-clock cap; the timed loop stops early once exceeded.
    pub max_time: Option<Duration>,
}

/// Result of one configuration run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Timed iterations actually executed.
    pub iterations: u64,
    /// Wall-clock time spent in the timed loop.
    pub elapsed: Duration,
    /// Sum of request + response bytes over the timed iterations.
    pub bytes_processed: u64,
}

/// Run one configuration to completion.
///
/// Setup (fixture, payload buffers, slot arming) happens before the first
/// timed iteration; teardown after the last.
pub fn run_config(cfg: &BenchConfig, budget: &RunBudget, seed: u64) -> Result<RunOutcome> {
    let fixture = Fixture::create(cfg.transport, &Config::default()).map_err(BenchError::Config)?;
    let pool = SlotPool::arm_all(fixture.server(), fixture.completion_queue());

    let mut run = ConfigRun {
        fixture: &fixture,
        pool,
        client_mutator: cfg.client_mutator.build(seed),
        server_mutator: cfg.server_mutator.build(seed.wrapping_add(1)),
        send_request: vec![b'a'; cfg.request_size],
        send_response: vec![b'a'; cfg.response_size],
        recv_response: Vec::with_capacity(cfg.response_size),
    };

    for _ in 0..budget.warmup {
        run.iteration()?;
    }

    let mut bytes_processed: u64 = 0;
    let mut iterations: u64 = 0;
    let start = Instant::now();
    for _ in 0..budget.iterations {
        bytes_processed += run.iteration()?;
        iterations += 1;
        if let Some(max_time) = budget.max_time {
            if start.elapsed() >= max_time {
                break;
            }
        }
    }
    let elapsed = start.elapsed();

    fixture.finish();
    Ok(RunOutcome {
        iterations,
        elapsed,
        bytes_processed,
    })
}

/// All state one configuration keeps across iterations. Payload buffers
/// are built once; the receive buffer is cleared, never reallocated.
struct ConfigRun<'a> {
    fixture: &'a Fixture,
    pool: SlotPool,
    client_mutator: Mutator,
    server_mutator: Mutator,
    send_request: Vec<u8>,
    send_response: Vec<u8>,
    recv_response: Vec<u8>,
}

impl ConfigRun<'_> {
    /// One full round trip. Returns the bytes processed.
    fn iteration(&mut self) -> Result<u64> {
        let cq = self.fixture.completion_queue();

        self.recv_response.clear();
        let mut cli_ctx = ClientContext::new();
        self.client_mutator.apply_client(&mut cli_ctx);
        let mut call = self
            .fixture
            .channel()
            .unary(&cli_ctx, &self.send_request, cq)
            .map_err(|e| BenchError::Invariant(format!("failed to issue client call: {}", e)))?;

        // Both slots are pre-armed, so the next event is necessarily an
        // accept; which slot matched is up to the server.
        let accept = next_completion(cq)?;
        let slot_index = match BenchTag::decode(accept.tag)? {
            BenchTag::SlotAccepted(index) => index,
            other => {
                return Err(BenchError::Invariant(format!(
                    "expected a slot accept, drained {:?}",
                    other
                )))
            }
        };

        let slot = self.pool.slot_mut(slot_index);
        self.server_mutator.apply_server(&mut slot.ctx);
        slot.call
            .finish(&slot.ctx, &self.send_response, Status::ok(), TAG_SERVER_FINISH)
            .map_err(|e| BenchError::Invariant(format!("server finish failed: {}", e)))?;
        call.finish(TAG_CLIENT_FINISH);

        drain_finishes(cq, TagMask::both_finishes())?;

        let status = call
            .recv_into(&mut self.recv_response)
            .map_err(|e| BenchError::Invariant(format!("client response readout failed: {}", e)))?;
        verify_status(status)?;

        self.pool
            .retire_and_rearm(slot_index, self.fixture.server(), cq);

        Ok((self.send_request.len() + self.recv_response.len()) as u64)
    }
}

/// Wait for one event and require success.
fn next_completion(cq: &CompletionQueue) -> Result<Completion> {
    let ev = cq
        .next_timeout(DRAIN_TIMEOUT)
        .ok_or_else(|| BenchError::Invariant("completion queue stalled".to_string()))?;
    if !ev.ok {
        return Err(BenchError::Invariant(format!(
            "completion for tag {} reported failure",
            ev.tag
        )));
    }
    Ok(ev)
}

/// Drain events until every tag in `pending` has completed, accepting
/// either arrival order of the racing finishes.
pub fn drain_finishes(cq: &CompletionQueue, mut pending: TagMask) -> Result<()> {
    while !pending.is_empty() {
        let ev = next_completion(cq)?;
        pending.clear(BenchTag::decode(ev.tag)?)?;
    }
    Ok(())
}

/// A non-success final status means a harness or environment defect.
fn verify_status(status: Status) -> Result<()> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(BenchError::CallFailed(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::Transport;
    use crate::matrix::BenchConfig;
    use crate::mutator::MutatorSpec;
    use crate::tag::NUM_SLOTS;
    use cqrpc::StatusCode;

    fn budget(iterations: u64) -> RunBudget {
        RunBudget {
            warmup: 2,
            iterations,
            max_time: None,
        }
    }

    fn config(transport: Transport, request_size: usize, response_size: usize) -> BenchConfig {
        BenchConfig {
            transport,
            client_mutator: MutatorSpec::NoOp,
            server_mutator: MutatorSpec::NoOp,
            request_size,
            response_size,
        }
    }

    // =========================================================================
    // Drain Logic (synthetic completions)
    // =========================================================================

    #[test]
    fn test_drain_accepts_either_order() {
        for order in [
            [TAG_SERVER_FINISH, TAG_CLIENT_FINISH],
            [TAG_CLIENT_FINISH, TAG_SERVER_FINISH],
        ] {
            let cq = CompletionQueue::new();
            let tx = cq.sender();
            for tag in order {
                tx.post(tag, true);
            }
            drain_finishes(&cq, TagMask::both_finishes()).expect("either order must drain");
        }
    }

    #[test]
    fn test_drain_rejects_unexpected_tag() {
        let cq = CompletionQueue::new();
        cq.sender().post(0, true); // a slot-accept tag during the finish drain
        match drain_finishes(&cq, TagMask::both_finishes()) {
            Err(BenchError::Invariant(_)) => {}
            other => panic!("expected invariant violation, got {:?}", other),
        }
    }

    #[test]
    fn test_drain_rejects_out_of_range_tag() {
        let cq = CompletionQueue::new();
        cq.sender().post(99, true);
        assert!(matches!(
            drain_finishes(&cq, TagMask::both_finishes()),
            Err(BenchError::Invariant(_))
        ));
    }

    #[test]
    fn test_drain_rejects_failed_completion() {
        let cq = CompletionQueue::new();
        cq.sender().post(TAG_CLIENT_FINISH, false);
        match drain_finishes(&cq, TagMask::both_finishes()) {
            Err(BenchError::Invariant(msg)) => {
                assert!(msg.contains("reported failure"), "diagnostic: {}", msg)
            }
            other => panic!("expected invariant violation, got {:?}", other),
        }
    }

    #[test]
    fn test_non_ok_status_is_fatal() {
        let status = Status::new(StatusCode::Internal, "injected");
        match verify_status(status) {
            Err(BenchError::CallFailed(s)) => assert_eq!(s.code(), StatusCode::Internal),
            other => panic!("expected CallFailed, got {:?}", other),
        }
    }

    // =========================================================================
    // Full Runs (in-process fixture)
    // =========================================================================

    #[test]
    fn test_bytes_processed_is_request_plus_response() {
        let outcome = run_config(&config(Transport::InProcess, 64, 128), &budget(10), 1)
            .expect("run");
        assert_eq!(outcome.iterations, 10);
        assert_eq!(outcome.bytes_processed, 10 * (64 + 128));
    }

    #[test]
    fn test_zero_sizes_process_zero_bytes() {
        let outcome =
            run_config(&config(Transport::InProcess, 0, 0), &budget(25), 1).expect("run");
        assert_eq!(outcome.bytes_processed, 0);
    }

    #[test]
    fn test_bytes_per_iteration_is_reproducible() {
        let a = run_config(&config(Transport::InProcess, 100, 3), &budget(5), 1).expect("run");
        let b = run_config(&config(Transport::InProcess, 100, 3), &budget(20), 1).expect("run");
        assert_eq!(a.bytes_processed / a.iterations, b.bytes_processed / b.iterations);
        assert_eq!(a.bytes_processed / a.iterations, 103);
    }

    #[test]
    fn test_run_over_socket_transports() {
        for transport in [Transport::Tcp, Transport::Uds, Transport::SockPair] {
            let outcome = run_config(&config(transport, 32, 32), &budget(10), 1).expect("run");
            assert_eq!(outcome.bytes_processed, 10 * 64);
        }
    }

    #[test]
    fn test_metadata_config_runs() {
        let cfg = BenchConfig {
            transport: Transport::InProcess,
            client_mutator: MutatorSpec::ClientMetadata {
                kind: crate::mutator::ValueKind::Binary,
                value_len: 31,
                count: 2,
            },
            server_mutator: MutatorSpec::ServerMetadata {
                kind: crate::mutator::ValueKind::Ascii,
                value_len: 10,
                count: 100,
            },
            request_size: 0,
            response_size: 0,
        };
        let outcome = run_config(&cfg, &budget(10), 1).expect("run");
        assert_eq!(outcome.iterations, 10);
        assert_eq!(outcome.bytes_processed, 0);
    }

    #[test]
    fn test_slot_pool_stays_fully_armed_across_iterations() {
        let fixture =
            Fixture::create(Transport::InProcess, &Config::default()).expect("fixture");
        let pool = SlotPool::arm_all(fixture.server(), fixture.completion_queue());
        let mut run = ConfigRun {
            fixture: &fixture,
            pool,
            client_mutator: MutatorSpec::NoOp.build(1),
            server_mutator: MutatorSpec::NoOp.build(2),
            send_request: vec![b'a'; 8],
            send_response: vec![b'a'; 8],
            recv_response: Vec::new(),
        };

        assert_eq!(run.pool.armed_count(), NUM_SLOTS);
        for _ in 0..10 {
            run.iteration().expect("iteration");
            assert_eq!(
                run.pool.armed_count(),
                NUM_SLOTS,
                "every idle slot must be re-armed before the iteration ends"
            );
        }
    }

    #[test]
    fn test_time_budget_stops_early() {
        let budget = RunBudget {
            warmup: 0,
            iterations: u64::MAX,
            max_time: Some(Duration::from_millis(50)),
        };
        let outcome =
            run_config(&config(Transport::InProcess, 0, 0), &budget, 1).expect("run");
        assert!(outcome.iterations > 0);
        assert!(outcome.elapsed >= Duration::from_millis(50));
    }
}
