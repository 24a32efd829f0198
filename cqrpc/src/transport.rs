//! Connected duplex transports.
//!
//! A [`Duplex`] is one end of an established bidirectional message pipe.
//! Four flavors exist: loopback TCP, Unix domain socket, raw socket pair,
//! and an in-process short-circuit that moves decoded [`Frame`] values
//! through channels without touching the wire codec.
//!
//! Each duplex splits into a cloneable [`FrameSender`] (used from the
//! calling thread) and a [`FrameReceiver`] (consumed by one reader thread).

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Monotonic counter for unique Unix socket paths within one process.
static UDS_COUNTER: AtomicU64 = AtomicU64::new(0);

enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    fn try_clone(&self) -> io::Result<Stream> {
        match self {
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
        }
    }

    /// Shut down both directions. Unblocks a reader sharing the socket.
    fn shutdown(&self) {
        let _ = match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}

struct StreamWriter {
    stream: Stream,
    /// Reusable encode buffer; frames are serialized here before one
    /// write_all, so a frame is never interleaved on the wire.
    scratch: Vec<u8>,
}

/// Sending half of a duplex. Cloneable and usable from any thread.
#[derive(Clone)]
pub struct FrameSender {
    inner: SenderInner,
}

#[derive(Clone)]
enum SenderInner {
    Stream(Arc<Mutex<StreamWriter>>),
    Chan(Arc<Mutex<Option<Sender<Frame>>>>),
}

impl FrameSender {
    /// Send one frame to the peer.
    pub fn send(&self, frame: Frame) -> Result<()> {
        match &self.inner {
            SenderInner::Stream(w) => {
                let mut w = w.lock().unwrap_or_else(|e| e.into_inner());
                let StreamWriter { stream, scratch } = &mut *w;
                frame.write_to(stream, scratch)
            }
            SenderInner::Chan(tx) => {
                let tx = tx.lock().unwrap_or_else(|e| e.into_inner());
                match tx.as_ref() {
                    Some(tx) => tx.send(frame).map_err(|_| Error::Disconnected),
                    None => Err(Error::Disconnected),
                }
            }
        }
    }

    /// Close this end. The peer's receiver observes a disconnect.
    ///
    /// Idempotent; sends after close fail with [`Error::Disconnected`].
    pub fn close(&self) {
        match &self.inner {
            SenderInner::Stream(w) => {
                let w = w.lock().unwrap_or_else(|e| e.into_inner());
                w.stream.shutdown();
            }
            SenderInner::Chan(tx) => {
                let mut tx = tx.lock().unwrap_or_else(|e| e.into_inner());
                tx.take();
            }
        }
    }
}

/// Receiving half of a duplex. Owned by exactly one reader thread.
pub struct FrameReceiver {
    inner: RecvInner,
}

enum RecvInner {
    Stream {
        reader: BufReader<Stream>,
        max_payload: usize,
    },
    Chan(Receiver<Frame>),
}

impl FrameReceiver {
    /// Block until the next frame arrives.
    ///
    /// Returns [`Error::Disconnected`] once the peer is gone.
    pub fn recv(&mut self) -> Result<Frame> {
        match &mut self.inner {
            RecvInner::Stream {
                reader,
                max_payload,
            } => Frame::read_from(reader, *max_payload),
            RecvInner::Chan(rx) => rx.recv().map_err(|_| Error::Disconnected),
        }
    }
}

/// One end of an established bidirectional message pipe.
pub struct Duplex {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl Duplex {
    /// Split into the sending and receiving halves.
    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }

    fn from_stream(stream: Stream, config: &Config) -> Result<Duplex> {
        let write_half = stream.try_clone()?;
        Ok(Duplex {
            sender: FrameSender {
                inner: SenderInner::Stream(Arc::new(Mutex::new(StreamWriter {
                    stream: write_half,
                    scratch: Vec::new(),
                }))),
            },
            receiver: FrameReceiver {
                inner: RecvInner::Stream {
                    reader: BufReader::new(stream),
                    max_payload: config.max_message_size,
                },
            },
        })
    }
}

/// Establish a connected loopback TCP pair.
///
/// Returns `(accepted end, connecting end)`.
pub fn tcp_pair(config: &Config) -> Result<(Duplex, Duplex)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let connect = TcpStream::connect(addr)?;
    let (accept, _) = listener.accept()?;
    if config.nodelay {
        accept.set_nodelay(true)?;
        connect.set_nodelay(true)?;
    }
    Ok((
        Duplex::from_stream(Stream::Tcp(accept), config)?,
        Duplex::from_stream(Stream::Tcp(connect), config)?,
    ))
}

/// Establish a connected Unix-domain-socket pair through a listener.
///
/// The socket file lives in the system temp directory and is unlinked as
/// soon as the connection is accepted.
pub fn unix_pair(config: &Config) -> Result<(Duplex, Duplex)> {
    let path: PathBuf = std::env::temp_dir().join(format!(
        "cqrpc-{}-{}.sock",
        std::process::id(),
        UDS_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let connect = UnixStream::connect(&path)?;
    let (accept, _) = listener.accept()?;
    let _ = std::fs::remove_file(&path);
    Ok((
        Duplex::from_stream(Stream::Unix(accept), config)?,
        Duplex::from_stream(Stream::Unix(connect), config)?,
    ))
}

/// Establish a raw `socketpair(2)` pair (no listener involved).
pub fn socket_pair(config: &Config) -> Result<(Duplex, Duplex)> {
    let (a, b) = UnixStream::pair()?;
    Ok((
        Duplex::from_stream(Stream::Unix(a), config)?,
        Duplex::from_stream(Stream::Unix(b), config)?,
    ))
}

/// Establish an in-process pair that short-circuits the wire codec.
pub fn inproc_pair() -> (Duplex, Duplex) {
    let (tx_a, rx_b) = mpsc::channel();
    let (tx_b, rx_a) = mpsc::channel();
    let end = |tx: Sender<Frame>, rx: Receiver<Frame>| Duplex {
        sender: FrameSender {
            inner: SenderInner::Chan(Arc::new(Mutex::new(Some(tx)))),
        },
        receiver: FrameReceiver {
            inner: RecvInner::Chan(rx),
        },
    };
    (end(tx_a, rx_a), end(tx_b, rx_b))
}
