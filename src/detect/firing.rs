//! # Per-firing single-winner gate.
//!
//! A [`Firing`] is the ephemeral correlation scope spanning one occurrence of
//! a trial's underlying signal. All evaluation tasks spawned for that
//! occurrence share one gate; the first to succeed flips it and resolves the
//! firing's completion signal.
//!
//! ## Rules
//! - The flag transition is a single compare-and-set: across all evaluation
//!   tasks of one firing, **at most one** [`Firing::try_win`] returns `true`.
//! - The completion signal resolves at most once, with the winner's value.
//! - If no evaluation wins, dropping the last gate handle closes the signal
//!   and the firing resolves to nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

pub(crate) struct Firing<R> {
    won: AtomicBool,
    complete: Mutex<Option<oneshot::Sender<R>>>,
}

impl<R: Send> Firing<R> {
    /// Creates a gate and the completion signal it resolves.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<R>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                won: AtomicBool::new(false),
                complete: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Attempts to win this firing with `value`.
    ///
    /// Returns `true` for exactly one caller; that caller's value resolves
    /// the completion signal. Losers keep their value and simply get `false`.
    pub fn try_win(&self, value: R) -> bool {
        if self
            .won
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(tx) = self
            .complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            // The receiver may already be gone (detector disabled mid-firing).
            let _ = tx.send(value);
        }
        true
    }

    #[cfg(test)]
    pub fn is_won(&self) -> bool {
        self.won.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_one_winner_under_contention() {
        for _ in 0..200 {
            let (firing, done) = Firing::new();
            let mut attempts = Vec::new();
            for candidate in 0..16u32 {
                let gate = Arc::clone(&firing);
                attempts.push(tokio::spawn(async move { gate.try_win(candidate) }));
            }

            let mut winners = 0;
            for attempt in attempts {
                if attempt.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "compare-and-set races must resolve to one winner");
            assert!(firing.is_won());
            assert!(done.await.is_ok(), "the winner resolves the completion signal");
        }
    }

    #[tokio::test]
    async fn test_unwon_firing_resolves_to_nothing() {
        let (firing, done) = Firing::<u32>::new();
        drop(firing);
        assert!(done.await.is_err());
    }

    #[tokio::test]
    async fn test_loser_keeps_its_value_private() {
        let (firing, done) = Firing::new();
        assert!(firing.try_win(1));
        assert!(!firing.try_win(2));
        assert_eq!(done.await.unwrap(), 1);
    }
}
