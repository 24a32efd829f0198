//! Shared completion queue.
//!
//! All asynchronous operation results are delivered as `(tag, ok)` events
//! through one queue. The queue is the sole synchronization point between
//! the transport reader threads and the thread driving the calls: event
//! delivery is serialized by the channel, so consumers need no further
//! locking to reason about ordering.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

/// One completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Identifies the outstanding operation this event belongs to.
    pub tag: u64,
    /// False when the operation failed (peer gone before it could complete).
    pub ok: bool,
}

/// Completion queue shared by all operations of one benchmark fixture.
pub struct CompletionQueue {
    tx: Sender<Completion>,
    rx: Mutex<Receiver<Completion>>,
}

impl CompletionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Block until the next completion event is available.
    pub fn next(&self) -> Completion {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        // The queue owns a sender, so recv() cannot observe disconnection.
        match rx.recv() {
            Ok(c) => c,
            Err(_) => unreachable!("completion queue sender kept alive by the queue"),
        }
    }

    /// Block for the next completion event, up to `timeout`.
    ///
    /// Returns `None` on timeout. An expected event that never arrives is a
    /// harness defect; callers treat `None` as fatal rather than retrying.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Completion> {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        match rx.recv_timeout(timeout) {
            Ok(c) => Some(c),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                unreachable!("completion queue sender kept alive by the queue")
            }
        }
    }

    /// Get a producer handle for posting events into this queue.
    pub fn sender(&self) -> CompletionSender {
        CompletionSender {
            tx: self.tx.clone(),
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle for a [`CompletionQueue`].
#[derive(Clone)]
pub struct CompletionSender {
    tx: Sender<Completion>,
}

impl CompletionSender {
    /// Post a completion event.
    ///
    /// Posting after the queue has been dropped is a no-op; that only
    /// happens during fixture teardown.
    pub fn post(&self, tag: u64, ok: bool) {
        let _ = self.tx.send(Completion { tag, ok });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_and_next() {
        let cq = CompletionQueue::new();
        let tx = cq.sender();
        tx.post(7, true);
        tx.post(3, false);
        assert_eq!(cq.next(), Completion { tag: 7, ok: true });
        assert_eq!(cq.next(), Completion { tag: 3, ok: false });
    }

    #[test]
    fn test_next_timeout_empty() {
        let cq = CompletionQueue::new();
        assert_eq!(cq.next_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_senders_from_multiple_threads() {
        let cq = CompletionQueue::new();
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let tx = cq.sender();
                std::thread::spawn(move || tx.post(i, true))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut tags: Vec<u64> = (0..4).map(|_| cq.next().tag).collect();
        tags.sort_unstable();
        assert_eq!(tags, vec![0, 1, 2, 3]);
    }
}
