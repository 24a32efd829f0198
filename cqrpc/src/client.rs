//! Client channel, call context, and unary call handles.
//!
//! A [`Channel`] owns one connection end and a reader thread that decodes
//! response frames and posts completions. Issuing a call is non-blocking:
//! the request frame is written from the calling thread and a [`UnaryCall`]
//! handle tracks the in-flight exchange until its completion is drained
//! from the queue.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use slab::Slab;

use crate::completion::{CompletionQueue, CompletionSender};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameKind};
use crate::metadata::MetadataMap;
use crate::status::{Status, StatusCode};
use crate::transport::{Duplex, FrameSender};

/// Per-call client context.
///
/// Metadata placed here is sent with the request. A fresh context is
/// created for every call.
#[derive(Debug, Default)]
pub struct ClientContext {
    metadata: MetadataMap,
}

impl ClientContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata to send with the request.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Mutable access for context mutators.
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }
}

struct CallOutcome {
    /// False when the connection died before the response arrived.
    ok: bool,
    status: Status,
    initial_metadata: MetadataMap,
    payload: Vec<u8>,
}

struct PendingCall {
    cq: CompletionSender,
    /// Tag registered by `finish()`; the completion is posted once both
    /// the tag and the outcome are present, in whichever order they land.
    finish_tag: Option<u64>,
    outcome: Option<CallOutcome>,
}

struct ChannelInner {
    tx: FrameSender,
    pending: Mutex<Slab<PendingCall>>,
}

impl ChannelInner {
    fn pending(&self) -> MutexGuard<'_, Slab<PendingCall>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reader thread: response arrived for `frame.call_id`.
    fn complete(&self, frame: Frame) {
        let mut pending = self.pending();
        // An unknown id means the call handle was dropped; discard.
        if let Some(entry) = pending.get_mut(frame.call_id as usize) {
            entry.outcome = Some(CallOutcome {
                ok: true,
                status: frame.status,
                initial_metadata: frame.metadata,
                payload: frame.payload,
            });
            if let Some(tag) = entry.finish_tag {
                entry.cq.post(tag, true);
            }
        }
    }

    /// Reader thread: connection gone; fail every call still in flight.
    fn fail_pending(&self) {
        let mut pending = self.pending();
        for (_, entry) in pending.iter_mut() {
            if entry.outcome.is_none() {
                entry.outcome = Some(CallOutcome {
                    ok: false,
                    status: Status::new(StatusCode::Unavailable, "connection closed"),
                    initial_metadata: MetadataMap::new(),
                    payload: Vec::new(),
                });
                if let Some(tag) = entry.finish_tag {
                    entry.cq.post(tag, false);
                }
            }
        }
    }
}

/// Client side of one connection.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Take ownership of a connection end and start its reader thread.
    pub fn connect(duplex: Duplex) -> Channel {
        let (tx, mut rx) = duplex.split();
        let inner = Arc::new(ChannelInner {
            tx,
            pending: Mutex::new(Slab::new()),
        });
        let reader_inner = Arc::clone(&inner);
        thread::Builder::new()
            .name("cqrpc-channel-reader".into())
            .spawn(move || loop {
                match rx.recv() {
                    Ok(frame) => {
                        if frame.kind == FrameKind::Response {
                            reader_inner.complete(frame);
                        }
                    }
                    Err(_) => {
                        reader_inner.fail_pending();
                        break;
                    }
                }
            })
            .expect("failed to spawn channel reader thread");
        Channel { inner }
    }

    /// Issue the unary call without blocking.
    ///
    /// The request (with the context's metadata) is sent immediately; the
    /// returned handle completes on `cq` once [`UnaryCall::finish`]
    /// registers a tag and the response arrives.
    pub fn unary(
        &self,
        ctx: &ClientContext,
        payload: &[u8],
        cq: &CompletionQueue,
    ) -> Result<UnaryCall> {
        let key = self.inner.pending().insert(PendingCall {
            cq: cq.sender(),
            finish_tag: None,
            outcome: None,
        });
        let frame = Frame::request(key as u64, ctx.metadata().clone(), payload.to_vec());
        if let Err(e) = self.inner.tx.send(frame) {
            self.inner.pending().try_remove(key);
            return Err(e);
        }
        Ok(UnaryCall {
            inner: Arc::clone(&self.inner),
            key,
            consumed: false,
        })
    }

    /// Close this end of the connection. Idempotent.
    ///
    /// The reader thread exits once the inbound direction disconnects,
    /// which for the socket transports happens immediately and for the
    /// in-process transport once the peer closes too.
    pub fn close(&self) {
        self.inner.tx.close();
    }
}

/// Handle for one in-flight unary call.
pub struct UnaryCall {
    inner: Arc<ChannelInner>,
    key: usize,
    consumed: bool,
}

/// Everything the server sent back for one call.
pub struct UnaryReply {
    pub status: Status,
    pub initial_metadata: MetadataMap,
    pub payload: Vec<u8>,
}

impl UnaryCall {
    /// Register interest in the response completion.
    ///
    /// A `(tag, ok)` event is posted to the call's queue once the response
    /// has arrived, immediately if it already has.
    pub fn finish(&self, tag: u64) {
        let mut pending = self.inner.pending();
        if let Some(entry) = pending.get_mut(self.key) {
            entry.finish_tag = Some(tag);
            if let Some(outcome) = &entry.outcome {
                entry.cq.post(tag, outcome.ok);
            }
        }
    }

    fn take_outcome(&mut self) -> Result<CallOutcome> {
        if self.consumed {
            return Err(Error::AlreadyFinished);
        }
        let mut pending = self.inner.pending();
        let ready = pending
            .get(self.key)
            .map(|e| e.outcome.is_some())
            .unwrap_or(false);
        if !ready {
            return Err(Error::NotReady);
        }
        self.consumed = true;
        let outcome = pending
            .try_remove(self.key)
            .and_then(|e| e.outcome)
            .ok_or(Error::NotReady)?;
        drop(pending);
        if !outcome.ok {
            return Err(Error::Disconnected);
        }
        Ok(outcome)
    }

    /// Copy the response payload into `buf` and return the call status.
    ///
    /// Appends to `buf` so a cleared buffer keeps its capacity across
    /// calls. Only valid after the finish completion has been drained.
    pub fn recv_into(&mut self, buf: &mut Vec<u8>) -> Result<Status> {
        let outcome = self.take_outcome()?;
        buf.extend_from_slice(&outcome.payload);
        Ok(outcome.status)
    }

    /// Take the full reply by value.
    pub fn recv(&mut self) -> Result<UnaryReply> {
        let outcome = self.take_outcome()?;
        Ok(UnaryReply {
            status: outcome.status,
            initial_metadata: outcome.initial_metadata,
            payload: outcome.payload,
        })
    }
}

impl Drop for UnaryCall {
    fn drop(&mut self) {
        if !self.consumed {
            self.inner.pending().try_remove(self.key);
        }
    }
}
