//! cqrpc integration tests.
//!
//! These exercise the full stack over every transport: arming accepts,
//! issuing calls, completion correlation, metadata, and teardown.
//!
//! Run with:
//! ```bash
//! cargo test --package cqrpc --test unary_tests
//! ```

use std::time::Duration;

use cqrpc::{
    inproc_pair, socket_pair, tcp_pair, unix_pair, Channel, ClientContext, CompletionQueue,
    Config, Duplex, MetadataValue, Server, ServerContext, Status, StatusCode,
};

const WAIT: Duration = Duration::from_secs(10);

// =============================================================================
// Helpers
// =============================================================================

struct Rig {
    server: Server,
    channel: Channel,
    cq: CompletionQueue,
}

impl Rig {
    fn new(pair: (Duplex, Duplex)) -> Self {
        cqrpc::init();
        let (server_end, client_end) = pair;
        Self {
            server: Server::start(server_end),
            channel: Channel::connect(client_end),
            cq: CompletionQueue::new(),
        }
    }

    fn next(&self) -> cqrpc::Completion {
        self.cq
            .next_timeout(WAIT)
            .expect("completion did not arrive")
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.channel.close();
        self.server.close();
    }
}

/// One accept + one call + both finishes, verifying the echo payload.
fn round_trip(rig: &Rig, request: &[u8], response: &[u8]) {
    let incoming = rig.server.request_unary(&rig.cq, 0);
    let mut call = rig
        .channel
        .unary(&ClientContext::new(), request, &rig.cq)
        .expect("unary");

    let accept = rig.next();
    assert_eq!(accept.tag, 0);
    assert!(accept.ok);
    assert_eq!(incoming.request().expect("request"), request);

    incoming
        .finish(&ServerContext::new(), response, Status::ok(), 1)
        .expect("finish");
    call.finish(2);

    let mut seen = [false; 2];
    for _ in 0..2 {
        let ev = rig.next();
        assert!(ev.ok);
        let idx = (ev.tag - 1) as usize;
        assert!(!seen[idx], "duplicate completion for tag {}", ev.tag);
        seen[idx] = true;
    }

    let reply = call.recv().expect("recv");
    assert!(reply.status.is_ok());
    assert_eq!(reply.payload, response);
}

// =============================================================================
// Round Trips Per Transport
// =============================================================================

#[test]
fn test_round_trip_tcp() {
    let rig = Rig::new(tcp_pair(&Config::default()).expect("tcp pair"));
    round_trip(&rig, b"hello", b"world");
}

#[test]
fn test_round_trip_unix() {
    let rig = Rig::new(unix_pair(&Config::default()).expect("unix pair"));
    round_trip(&rig, b"hello", b"world");
}

#[test]
fn test_round_trip_socket_pair() {
    let rig = Rig::new(socket_pair(&Config::default()).expect("socket pair"));
    round_trip(&rig, b"hello", b"world");
}

#[test]
fn test_round_trip_inproc() {
    let rig = Rig::new(inproc_pair());
    round_trip(&rig, b"hello", b"world");
}

#[test]
fn test_empty_payloads() {
    let rig = Rig::new(inproc_pair());
    round_trip(&rig, b"", b"");
}

#[test]
fn test_large_payload_framing() {
    // Big enough to span many socket buffers.
    let rig = Rig::new(socket_pair(&Config::default()).expect("socket pair"));
    let request = vec![0xABu8; 4 * 1024 * 1024];
    let response = vec![0xCDu8; 2 * 1024 * 1024];
    round_trip(&rig, &request, &response);
}

#[test]
fn test_many_sequential_round_trips() {
    let rig = Rig::new(tcp_pair(&Config::default()).expect("tcp pair"));
    for i in 0..100u32 {
        let payload = i.to_le_bytes();
        round_trip(&rig, &payload, &payload);
    }
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_metadata_round_trip() {
    let rig = Rig::new(tcp_pair(&Config::default()).expect("tcp pair"));

    let incoming = rig.server.request_unary(&rig.cq, 0);
    let mut ctx = ClientContext::new();
    ctx.metadata_mut().insert_ascii("user", "bench");
    ctx.metadata_mut().insert_binary("blob-bin", vec![0, 159, 146, 150]);
    let mut call = rig.channel.unary(&ctx, b"", &rig.cq).expect("unary");

    assert!(rig.next().ok);
    let md = incoming.metadata().expect("metadata");
    assert_eq!(md.len(), 2);
    assert_eq!(
        md.get("user"),
        Some(&MetadataValue::Ascii("bench".to_string()))
    );
    assert_eq!(
        md.get("blob-bin"),
        Some(&MetadataValue::Binary(vec![0, 159, 146, 150]))
    );

    let mut sctx = ServerContext::new();
    sctx.initial_metadata_mut().insert_ascii("served-by", "rig");
    incoming
        .finish(&sctx, b"", Status::ok(), 1)
        .expect("finish");
    call.finish(2);
    rig.next();
    rig.next();

    let reply = call.recv().expect("recv");
    assert_eq!(
        reply.initial_metadata.get("served-by"),
        Some(&MetadataValue::Ascii("rig".to_string()))
    );
}

// =============================================================================
// Status
// =============================================================================

#[test]
fn test_status_propagation() {
    let rig = Rig::new(inproc_pair());

    let incoming = rig.server.request_unary(&rig.cq, 0);
    let mut call = rig
        .channel
        .unary(&ClientContext::new(), b"x", &rig.cq)
        .expect("unary");
    assert!(rig.next().ok);

    incoming
        .finish(
            &ServerContext::new(),
            b"",
            Status::new(StatusCode::Internal, "synthetic failure"),
            1,
        )
        .expect("finish");
    call.finish(2);
    rig.next();
    rig.next();

    let reply = call.recv().expect("recv");
    assert_eq!(reply.status.code(), StatusCode::Internal);
    assert_eq!(reply.status.message(), "synthetic failure");
}

// =============================================================================
// Accept/Request Interleavings
// =============================================================================

#[test]
fn test_request_before_accept_is_buffered() {
    let rig = Rig::new(inproc_pair());

    // Call first; nothing armed yet.
    let mut call = rig
        .channel
        .unary(&ClientContext::new(), b"early", &rig.cq)
        .expect("unary");
    // Give the server reader time to buffer the request.
    std::thread::sleep(Duration::from_millis(50));

    // Arming now must match the buffered request immediately.
    let incoming = rig.server.request_unary(&rig.cq, 5);
    let accept = rig.next();
    assert_eq!(accept.tag, 5);
    assert!(accept.ok);
    assert_eq!(incoming.request().expect("request"), b"early");

    incoming
        .finish(&ServerContext::new(), b"late", Status::ok(), 1)
        .expect("finish");
    call.finish(2);
    rig.next();
    rig.next();
    assert_eq!(call.recv().expect("recv").payload, b"late");
}

#[test]
fn test_two_armed_accepts_match_fifo() {
    let rig = Rig::new(inproc_pair());

    let first = rig.server.request_unary(&rig.cq, 0);
    let second = rig.server.request_unary(&rig.cq, 1);
    assert!(first.is_pending());
    assert!(second.is_pending());

    let mut call = rig
        .channel
        .unary(&ClientContext::new(), b"one", &rig.cq)
        .expect("unary");
    let accept = rig.next();
    assert_eq!(accept.tag, 0, "oldest armed accept matches first");
    assert!(!first.is_pending());
    assert!(second.is_pending());

    first
        .finish(&ServerContext::new(), b"", Status::ok(), 2)
        .expect("finish");
    call.finish(3);
    rig.next();
    rig.next();
    call.recv().expect("recv");
}

// =============================================================================
// Teardown
// =============================================================================

#[test]
fn test_close_fails_armed_accept() {
    let rig = Rig::new(socket_pair(&Config::default()).expect("socket pair"));
    let incoming = rig.server.request_unary(&rig.cq, 0);

    rig.channel.close();
    let ev = rig.next();
    assert_eq!(ev.tag, 0);
    assert!(!ev.ok, "accept on a dead connection must complete unsuccessfully");
    assert!(!incoming.is_pending());
}

#[test]
fn test_close_fails_inflight_call() {
    let rig = Rig::new(socket_pair(&Config::default()).expect("socket pair"));

    // No accept armed on purpose; the call can never be answered.
    let call = rig
        .channel
        .unary(&ClientContext::new(), b"x", &rig.cq)
        .expect("unary");
    call.finish(7);

    rig.server.close();
    let ev = rig.next();
    assert_eq!(ev.tag, 7);
    assert!(!ev.ok);
}

#[test]
fn test_recv_before_completion_is_not_ready() {
    let rig = Rig::new(inproc_pair());
    let _incoming = rig.server.request_unary(&rig.cq, 0);
    let mut call = rig
        .channel
        .unary(&ClientContext::new(), b"x", &rig.cq)
        .expect("unary");
    // The response cannot exist yet; reading must refuse, not block.
    match call.recv() {
        Err(cqrpc::Error::NotReady) => {}
        other => panic!("expected NotReady, got {:?}", other.map(|r| r.payload)),
    }
}
