//! # Observer trait and worker.
//!
//! `Observe` is the extension point for plugging result consumers onto a
//! detector's notification stream (logging, metrics, game-state mirrors).
//! Each observer is driven by its own worker task.
//!
//! ## What the worker guarantees
//! - The detector is never blocked: the worker reads from its own broadcast
//!   receiver and lags independently.
//! - Panics inside an observer are caught and logged (isolation).
//! - The worker exits when the given token is cancelled or the stream closes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::detect::panic_reason;

/// Contract for notification observers.
///
/// Called from an observer-dedicated worker task. Implementations should
/// avoid blocking the async runtime (prefer async I/O and cooperative waits).
#[async_trait]
pub trait Observe<R>: Send + Sync + 'static {
    /// Handles one detected value.
    async fn on_value(&self, value: &R);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Spawns a worker draining `notifications` into `observer`.
///
/// The worker runs until `token` is cancelled or the stream closes; lagged
/// stretches are logged and skipped.
pub fn spawn_observer<R>(
    mut notifications: broadcast::Receiver<R>,
    observer: Arc<dyn Observe<R>>,
    token: CancellationToken,
) -> JoinHandle<()>
where
    R: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = notifications.recv() => match next {
                    Ok(value) => {
                        let handled = AssertUnwindSafe(observer.on_value(&value)).catch_unwind();
                        if let Err(panic) = handled.await {
                            error!(
                                observer = observer.name(),
                                reason = %panic_reason(panic),
                                "observer panicked; value skipped"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(observer = observer.name(), skipped, "observer lagged; values dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    })
}

/// Observer that logs every detected value at debug level.
///
/// Primarily useful for development and demos; implement a custom
/// [`Observe`] for metrics or state tracking.
#[derive(Debug, Default)]
pub struct TraceObserver;

#[async_trait]
impl<R> Observe<R> for TraceObserver
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    async fn on_value(&self, value: &R) {
        debug!(value = ?value, "detected");
    }

    fn name(&self) -> &'static str {
        "trace"
    }
}
