//! # cqrpc - Tag-correlated completion-queue RPC
//!
//! This crate implements a small unary RPC stack in the completion-queue
//! style: every asynchronous operation is issued with an integer tag and
//! retires by delivering a `(tag, ok)` event through one shared
//! [`CompletionQueue`]. Client and server sides of a connection live in
//! the same process and share that queue, which makes the stack a natural
//! substrate for loopback round-trip benchmarking.
//!
//! ## Features
//!
//! - **One blocking wait point**: all results are retrieved through
//!   `CompletionQueue::next()`; callers never poll or spin
//! - **Armed accepts**: the server matches arriving requests against
//!   pre-armed accept operations, FIFO, and buffers early requests
//! - **Four transports**: loopback TCP, Unix domain socket, raw socket
//!   pair, and an in-process short-circuit that skips the wire codec
//! - **Metadata contexts**: per-call client metadata and server initial
//!   metadata, with text-safe and binary-safe values
//!
//! ## Usage
//!
//! ```no_run
//! use cqrpc::{
//!     inproc_pair, Channel, ClientContext, CompletionQueue, Server, ServerContext, Status,
//! };
//!
//! cqrpc::init();
//! let (server_end, client_end) = inproc_pair();
//! let server = Server::start(server_end);
//! let channel = Channel::connect(client_end);
//! let cq = CompletionQueue::new();
//!
//! // Arm an accept, then issue a call against the same queue.
//! let incoming = server.request_unary(&cq, 0);
//! let mut call = channel.unary(&ClientContext::new(), b"ping", &cq)?;
//!
//! assert_eq!(cq.next().tag, 0); // accept matched
//! incoming.finish(&ServerContext::new(), b"pong", Status::ok(), 1)?;
//! call.finish(2);
//! cq.next(); // server finish
//! cq.next(); // client finish
//!
//! let reply = call.recv()?;
//! assert!(reply.status.is_ok());
//! assert_eq!(reply.payload, b"pong");
//! # Ok::<(), cqrpc::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: Connection configuration (`Config`)
//! - [`error`]: Error type and `Result` alias
//! - [`status`]: Call status (`Status`, `StatusCode`)
//! - [`metadata`]: Context metadata (`MetadataMap`)
//! - [`frame`]: Wire frame codec for the socket transports (`Frame`)
//! - [`transport`]: Connected duplex pairs and their send/recv halves
//! - [`completion`]: Shared completion queue (`CompletionQueue`)
//! - [`client`]: Channel, client context, and unary call handles
//! - [`server`]: Accept primitive and response writer

pub mod client;
pub mod completion;
pub mod config;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod server;
pub mod status;
pub mod transport;

// Re-export main types
pub use client::{Channel, ClientContext, UnaryCall, UnaryReply};
pub use completion::{Completion, CompletionQueue, CompletionSender};
pub use config::Config;
pub use error::{Error, Result};
pub use frame::{Frame, FrameKind};
pub use metadata::{MetadataEntry, MetadataMap, MetadataValue};
pub use server::{IncomingCall, Server, ServerContext};
pub use status::{Status, StatusCode};
pub use transport::{inproc_pair, socket_pair, tcp_pair, unix_pair, Duplex};

use std::sync::Once;

static INIT: Once = Once::new();

/// One-time process-wide setup. Idempotent; call before creating
/// transports.
///
/// Ignores `SIGPIPE` so a peer tearing down a socket mid-write cannot
/// kill the process. Test and benchmark harnesses do not always install
/// the handling a binary's runtime does, and a benchmark run must survive
/// fixture teardown races.
pub fn init() {
    INIT.call_once(|| unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    });
}
