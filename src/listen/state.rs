//! # Listenable with a durable latest-value cell.
//!
//! [`StateListenable`] extends [`Listenable`] with a "latest value" cell:
//! every published value is stored before it is broadcast, so late
//! subscribers that missed the broadcast can still read
//! [`StateListenable::previous`].
//!
//! ## Rules
//! - The cell is updated **before** the broadcast of the same value.
//! - The cell is single-writer-at-a-time per publication, multi-reader.
//! - Values land in the cell in the order publications happen, which for a
//!   detector is the order firings resolve, not the order they started.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use super::{Listenable, SourceId};

/// A hot stream that also remembers the most recent value.
#[derive(Debug)]
pub struct StateListenable<E> {
    inner: Listenable<E>,
    latest: Arc<RwLock<Option<E>>>,
}

impl<E> Clone for StateListenable<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            latest: Arc::clone(&self.latest),
        }
    }
}

impl<E: Clone + Send + 'static> StateListenable<E> {
    /// Creates a new state listenable with the given ring-buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Listenable::new(capacity),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Stores `value` as the latest value, then broadcasts it.
    pub fn publish(&self, value: E) {
        *self
            .latest
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
        self.inner.publish(value);
    }

    /// Returns the most recently published value, if any.
    pub fn previous(&self) -> Option<E> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Creates a new receiver observing subsequent values.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.inner.subscribe()
    }

    /// Returns the identity of this signal source.
    pub fn id(&self) -> SourceId {
        self.inner.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_previous_tracks_latest_publication() {
        let state: StateListenable<&str> = StateListenable::new(4);
        assert_eq!(state.previous(), None);

        state.publish("first");
        state.publish("second");
        assert_eq!(state.previous(), Some("second"));
    }

    #[tokio::test]
    async fn test_cell_is_visible_before_broadcast_delivery() {
        let state: StateListenable<u32> = StateListenable::new(4);
        let mut rx = state.subscribe();

        state.publish(9);
        // The broadcast has not been received yet, but the cell is set.
        assert_eq!(state.previous(), Some(9));
        assert_eq!(rx.recv().await.unwrap(), 9);
    }
}
