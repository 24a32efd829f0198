//! Transport fixtures.
//!
//! A [`Fixture`] owns everything one benchmark configuration talks to: the
//! server end, the client channel, and the completion queue both sides
//! share. Construction is the one-time setup that happens before the first
//! timed iteration; [`Fixture::finish`] is the matching teardown.

use cqrpc::{
    inproc_pair, socket_pair, tcp_pair, unix_pair, Channel, CompletionQueue, Config, Server,
};

/// Transport axis of the configuration matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Loopback TCP.
    Tcp,
    /// Unix domain socket through a listener.
    Uds,
    /// In-process short-circuit.
    InProcess,
    /// Raw socket pair.
    SockPair,
}

impl Transport {
    /// Short name used in benchmark identifiers.
    pub fn label(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Uds => "uds",
            Transport::InProcess => "inproc",
            Transport::SockPair => "sockpair",
        }
    }
}

/// One established client/server pair with its shared completion queue.
pub struct Fixture {
    server: Server,
    channel: Channel,
    cq: CompletionQueue,
}

impl Fixture {
    /// Establish the transport and bring up both ends.
    pub fn create(transport: Transport, config: &Config) -> cqrpc::Result<Fixture> {
        cqrpc::init();
        let (server_end, client_end) = match transport {
            Transport::Tcp => tcp_pair(config)?,
            Transport::Uds => unix_pair(config)?,
            Transport::InProcess => inproc_pair(),
            Transport::SockPair => socket_pair(config)?,
        };
        Ok(Fixture {
            server: Server::start(server_end),
            channel: Channel::connect(client_end),
            cq: CompletionQueue::new(),
        })
    }

    /// Server side of the connection.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Client side of the connection.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The queue shared by both sides' operations.
    pub fn completion_queue(&self) -> &CompletionQueue {
        &self.cq
    }

    /// Tear down both ends. Idempotent; also runs on drop.
    pub fn finish(&self) {
        self.channel.close();
        self.server.close();
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.finish();
    }
}
