//! Server accept primitive and response writer.
//!
//! The server never dispatches to handlers. Callers arm accepts with
//! [`Server::request_unary`]; when a request arrives it is matched to the
//! oldest armed accept and that accept's `(tag, ok)` completion is posted.
//! The matched [`IncomingCall`] then answers with
//! [`IncomingCall::finish`]. Requests that arrive before any accept is
//! armed are buffered and matched to the next arming.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::completion::{CompletionQueue, CompletionSender};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameKind};
use crate::metadata::MetadataMap;
use crate::status::Status;
use crate::transport::{Duplex, FrameSender};

/// Per-call server context.
///
/// Metadata placed here is sent as the response's initial metadata.
#[derive(Debug, Default)]
pub struct ServerContext {
    initial_metadata: MetadataMap,
}

impl ServerContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial metadata to send with the response.
    pub fn initial_metadata(&self) -> &MetadataMap {
        &self.initial_metadata
    }

    /// Mutable access for context mutators.
    pub fn initial_metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.initial_metadata
    }
}

struct IncomingState {
    cq: CompletionSender,
    /// Tag the accept completion is posted with.
    tag: u64,
    received: bool,
    failed: bool,
    finished: bool,
    call_id: u64,
    metadata: MetadataMap,
    payload: Vec<u8>,
}

struct IncomingInner {
    state: Mutex<IncomingState>,
}

impl IncomingInner {
    fn new(cq: CompletionSender, tag: u64) -> Self {
        Self {
            state: Mutex::new(IncomingState {
                cq,
                tag,
                received: false,
                failed: false,
                finished: false,
                call_id: 0,
                metadata: MetadataMap::new(),
                payload: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, IncomingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Match a request to this armed accept and post its completion.
    fn fill(&self, frame: Frame) {
        let mut st = self.state();
        st.received = true;
        st.call_id = frame.call_id;
        st.metadata = frame.metadata;
        st.payload = frame.payload;
        st.cq.post(st.tag, true);
    }

    /// Connection gone before a request matched this accept.
    fn fail(&self) {
        let mut st = self.state();
        st.failed = true;
        st.cq.post(st.tag, false);
    }
}

struct AcceptState {
    /// Armed accepts, matched FIFO against arriving requests.
    armed: VecDeque<Arc<IncomingInner>>,
    /// Requests that arrived with nothing armed.
    backlog: VecDeque<Frame>,
    closed: bool,
}

struct ServerShared {
    tx: FrameSender,
    accept: Mutex<AcceptState>,
}

impl ServerShared {
    fn accept(&self) -> MutexGuard<'_, AcceptState> {
        self.accept.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reader thread: request frame arrived.
    fn dispatch(&self, frame: Frame) {
        let mut accept = self.accept();
        match accept.armed.pop_front() {
            Some(inner) => {
                drop(accept);
                inner.fill(frame);
            }
            None => accept.backlog.push_back(frame),
        }
    }

    /// Reader thread: connection gone; fail everything still armed.
    fn fail_armed(&self) {
        let drained: Vec<_> = {
            let mut accept = self.accept();
            accept.closed = true;
            accept.armed.drain(..).collect()
        };
        for inner in drained {
            inner.fail();
        }
    }
}

/// Server side of one connection, exposing a single unary method.
pub struct Server {
    shared: Arc<ServerShared>,
}

impl Server {
    /// Take ownership of a connection end and start its reader thread.
    pub fn start(duplex: Duplex) -> Server {
        let (tx, mut rx) = duplex.split();
        let shared = Arc::new(ServerShared {
            tx,
            accept: Mutex::new(AcceptState {
                armed: VecDeque::new(),
                backlog: VecDeque::new(),
                closed: false,
            }),
        });
        let reader_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("cqrpc-server-reader".into())
            .spawn(move || loop {
                match rx.recv() {
                    Ok(frame) => {
                        if frame.kind == FrameKind::Request {
                            reader_shared.dispatch(frame);
                        }
                    }
                    Err(_) => {
                        reader_shared.fail_armed();
                        break;
                    }
                }
            })
            .expect("failed to spawn server reader thread");
        Server { shared }
    }

    /// Arm an accept for the next incoming call.
    ///
    /// A `(tag, ok)` event is posted to `cq` when a request matches this
    /// accept, immediately if one is already buffered. A `!ok` event
    /// means the connection is gone.
    pub fn request_unary(&self, cq: &CompletionQueue, tag: u64) -> IncomingCall {
        let inner = Arc::new(IncomingInner::new(cq.sender(), tag));
        let buffered = {
            let mut accept = self.shared.accept();
            if let Some(frame) = accept.backlog.pop_front() {
                Some(frame)
            } else if accept.closed {
                None
            } else {
                accept.armed.push_back(Arc::clone(&inner));
                return IncomingCall {
                    shared: Arc::clone(&self.shared),
                    inner,
                };
            }
        };
        match buffered {
            Some(frame) => inner.fill(frame),
            None => inner.fail(),
        }
        IncomingCall {
            shared: Arc::clone(&self.shared),
            inner,
        }
    }

    /// Close this end of the connection. Idempotent.
    ///
    /// The reader thread exits once the inbound direction disconnects.
    pub fn close(&self) {
        self.shared.tx.close();
    }
}

/// One armed (and possibly matched) incoming call.
pub struct IncomingCall {
    shared: Arc<ServerShared>,
    inner: Arc<IncomingInner>,
}

impl IncomingCall {
    /// True while armed and not yet matched to a request.
    pub fn is_pending(&self) -> bool {
        let st = self.inner.state();
        !st.received && !st.failed
    }

    /// Length of the matched request payload.
    pub fn request_len(&self) -> Result<usize> {
        let st = self.inner.state();
        if !st.received {
            return Err(Error::NotReady);
        }
        Ok(st.payload.len())
    }

    /// Copy of the matched request payload.
    pub fn request(&self) -> Result<Vec<u8>> {
        let st = self.inner.state();
        if !st.received {
            return Err(Error::NotReady);
        }
        Ok(st.payload.clone())
    }

    /// Copy of the matched request's metadata.
    pub fn metadata(&self) -> Result<MetadataMap> {
        let st = self.inner.state();
        if !st.received {
            return Err(Error::NotReady);
        }
        Ok(st.metadata.clone())
    }

    /// Send the response and post a `(tag, ok)` event to the queue this
    /// accept was armed with.
    ///
    /// The response carries the context's initial metadata. Only valid
    /// once matched; each call finishes at most once.
    pub fn finish(
        &self,
        ctx: &ServerContext,
        payload: &[u8],
        status: Status,
        tag: u64,
    ) -> Result<()> {
        let mut st = self.inner.state();
        if st.failed {
            return Err(Error::Disconnected);
        }
        if !st.received {
            return Err(Error::NotReady);
        }
        if st.finished {
            return Err(Error::AlreadyFinished);
        }
        let frame = Frame::response(
            st.call_id,
            status,
            ctx.initial_metadata().clone(),
            payload.to_vec(),
        );
        self.shared.tx.send(frame)?;
        st.finished = true;
        st.cq.post(tag, true);
        Ok(())
    }
}
