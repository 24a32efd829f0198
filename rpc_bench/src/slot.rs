//! Server-side call slot pool.
//!
//! Exactly [`NUM_SLOTS`] slots exist for the lifetime of a configuration
//! run. Each slot owns one armed accept and the server context its
//! response will carry. Keeping every idle slot armed is what guarantees
//! the server never stalls waiting to accept the next call: the accept for
//! iteration k was issued before iteration k's client call exists.

use cqrpc::{CompletionQueue, IncomingCall, Server, ServerContext};

use crate::tag::{BenchTag, NUM_SLOTS};

/// One reusable server-side call slot.
pub struct ServerSlot {
    /// Context for the response; reset with the slot, mutated per
    /// iteration by the server-side context mutator.
    pub ctx: ServerContext,
    /// The armed accept. Pending until a request matches it.
    pub call: IncomingCall,
}

impl ServerSlot {
    fn arm(server: &Server, cq: &CompletionQueue, index: usize) -> ServerSlot {
        ServerSlot {
            ctx: ServerContext::new(),
            call: server.request_unary(cq, BenchTag::SlotAccepted(index).encode()),
        }
    }
}

/// Fixed pool of [`NUM_SLOTS`] perpetually armed slots.
pub struct SlotPool {
    slots: Vec<ServerSlot>,
}

impl SlotPool {
    /// Construct and arm every slot, tags `0..NUM_SLOTS`.
    pub fn arm_all(server: &Server, cq: &CompletionQueue) -> SlotPool {
        SlotPool {
            slots: (0..NUM_SLOTS)
                .map(|index| ServerSlot::arm(server, cq, index))
                .collect(),
        }
    }

    /// Access the slot a decoded accept tag points at.
    pub fn slot_mut(&mut self, index: usize) -> &mut ServerSlot {
        &mut self.slots[index]
    }

    /// Replace a consumed slot in place and re-arm it with the same tag.
    ///
    /// Must happen before the iteration that consumed the slot is
    /// considered finished, so the server is ready for the next call.
    pub fn retire_and_rearm(&mut self, index: usize, server: &Server, cq: &CompletionQueue) {
        self.slots[index] = ServerSlot::arm(server, cq, index);
    }

    /// Number of slots whose accept is armed and not yet matched.
    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.call.is_pending()).count()
    }

    /// Total number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// A pool is never empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqrpc::{inproc_pair, Channel, Server};

    #[test]
    fn test_arm_all_arms_every_slot() {
        let (server_end, client_end) = inproc_pair();
        let server = Server::start(server_end);
        let channel = Channel::connect(client_end);
        let cq = CompletionQueue::new();

        let pool = SlotPool::arm_all(&server, &cq);
        assert_eq!(pool.len(), NUM_SLOTS);
        assert_eq!(pool.armed_count(), NUM_SLOTS);

        channel.close();
        server.close();
    }
}
