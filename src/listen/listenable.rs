//! # Hot broadcast stream for raw signals and notifications.
//!
//! [`Listenable`] is a thin wrapper around [`tokio::sync::broadcast`] that
//! provides non-blocking publishing from multiple sources to any number of
//! independent subscribers.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls
//!   `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent values for all
//!   receivers; the minimum capacity is 1 (clamped).
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip the
//!   `n` oldest items.
//! - **No persistence**: values are dropped if there are no active receivers
//!   at send time.
//!
//! Every listenable carries a [`SourceId`], a process-unique identity used for
//! basis affinity: a detection entry can be pinned to results produced by one
//! specific source.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

/// Global counter backing [`SourceId`] allocation.
static SOURCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a signal source.
///
/// Two [`Listenable`] values compare equal here only if one is a clone of the
/// other; clones share the underlying channel and the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        SourceId(SOURCE_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

/// Broadcast channel for one kind of signal.
///
/// Cheap to clone (internally holds an `Arc`-backed sender); clones publish
/// into and subscribe to the same stream.
#[derive(Debug)]
pub struct Listenable<E> {
    id: SourceId,
    tx: broadcast::Sender<E>,
}

impl<E> Clone for Listenable<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Listenable<E> {
    /// Creates a new listenable with the given ring-buffer capacity.
    ///
    /// Capacity is shared across all receivers; receivers that fall behind
    /// observe `RecvError::Lagged` on their next `recv()`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            id: SourceId::next(),
            tx,
        }
    }

    /// Publishes a value to all active receivers.
    ///
    /// If there are no receivers the value is dropped; this function still
    /// returns immediately.
    pub fn publish(&self, value: E) {
        let _ = self.tx.send(value);
    }

    /// Creates a new receiver observing subsequent values.
    ///
    /// Each call creates an independent receiver; a receiver only sees values
    /// published after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Returns the identity of this signal source.
    pub fn id(&self) -> SourceId {
        self.id
    }
}
