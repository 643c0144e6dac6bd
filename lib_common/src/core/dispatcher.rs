//! # Channel Dispatcher
//!
//! Fan-out for one channel. Every live connection owns a bounded receiver;
//! the dispatcher keeps the matching senders keyed by [`ConnectionId`] and
//! pushes frames to all of them, or to exactly one.
//!
//! A member whose receiver is gone (the socket task ended) is pruned on the
//! next send, so a missed `remove_member` never leaks a sender. A member whose
//! queue is full is evicted the same way: its sender is dropped, the socket
//! task drains what was already queued and then closes the connection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Frames a member may have queued before it counts as stalled.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Identity of one connection within a channel. Never reused.
pub type ConnectionId = u64;

/// A frame headed to a client socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A UTF-8 text frame: relayed JSON, a rollup array, or an error string.
    Text(String),
}

impl Outbound {
    pub fn text(&self) -> &str {
        match self {
            Outbound::Text(s) => s,
        }
    }
}

type Members = BTreeMap<ConnectionId, mpsc::Sender<Outbound>>;

/// Queues `frame` for one member. Returns `false` when the member has to go.
fn offer(id: ConnectionId, tx: &mpsc::Sender<Outbound>, frame: Outbound) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(conn = id, "evicting member, outbound queue full");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(conn = id, "pruning closed member");
            false
        }
    }
}

/// # Dispatcher
///
/// Membership is guarded by a plain mutex; no lock is held across an await.
#[derive(Debug)]
pub struct Dispatcher {
    members: Mutex<Members>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose members may each have `depth` frames queued.
    pub fn with_queue_depth(depth: usize) -> Self {
        Self {
            members: Mutex::default(),
            next_id: AtomicU64::new(0),
            queue_depth: depth.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Members> {
        // A panic while holding the lock leaves the map itself intact.
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new member and returns its id and frame receiver.
    pub fn add_member(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.lock().insert(id, tx);
        tracing::debug!(conn = id, "member joined");
        (id, rx)
    }

    /// Removes a member. Unknown ids are ignored.
    pub fn remove_member(&self, id: ConnectionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(conn = id, "member left");
        }
        removed
    }

    /// Sends `frame` to every member, sender included. Returns how many
    /// members received it.
    pub fn broadcast(&self, frame: Outbound) -> usize {
        let mut members = self.lock();
        members.retain(|id, tx| offer(*id, tx, frame.clone()));
        members.len()
    }

    /// Sends `frame` to a single member. Returns `false` when it is gone or
    /// was evicted.
    pub fn send_to(&self, id: ConnectionId, frame: Outbound) -> bool {
        let mut members = self.lock();
        let delivered = match members.get(&id) {
            Some(tx) => offer(id, tx, frame),
            None => return false,
        };
        if !delivered {
            members.remove(&id);
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
