//! # Trial descriptors.
//!
//! A [`Trial`] wraps one raw signal source ([`Listenable`]) into a stream of
//! [`ResultSupplier`]s — one per firing of the underlying signal. The
//! descriptor is immutable and owned by the detector built from it.
//!
//! ## Architecture
//! ```text
//! Listenable<C> ──► forwarder task (per enable cycle, token-bounded)
//!                        │  wraps each raw value C into a ResultSupplier
//!                        ▼
//!                 mpsc stream of suppliers ──► detector dispatch loop
//! ```
//!
//! ## Rules
//! - The forwarder subscribes to the basis synchronously when the stream is
//!   opened, so no firing published afterwards is missed.
//! - A lagged basis subscription is logged and skipped, never fatal.
//! - The forwarder exits when its token is cancelled, the basis closes, or
//!   the detector drops the stream.
//!
//! Two kinds of trials exist: detecting trials (passive) and requesting
//! trials, which additionally expose a *start* action used by requesters to
//! actively provoke the awaited condition.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::listen::{Listenable, SourceId};

use super::{ResultSupplier, TrialResult, TrialScope};

pub(crate) type StartFn<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, Option<R>> + Send + Sync>;

type SupplierSource<T, R> =
    Arc<dyn Fn(CancellationToken) -> mpsc::UnboundedReceiver<ResultSupplier<T, R>> + Send + Sync>;

/// Immutable descriptor of one wrapped signal source.
pub struct Trial<T, R> {
    basis: SourceId,
    source: SupplierSource<T, R>,
    start: Option<StartFn<T, R>>,
}

impl<T, R> std::fmt::Debug for Trial<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trial")
            .field("basis", &self.basis)
            .field("start", &self.start.is_some())
            .finish()
    }
}

impl<T, R> Trial<T, R>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Creates a passive (detecting) trial.
    ///
    /// `test` runs once per pending entry for every firing of `basis`; it
    /// receives the raw value, the attempt scope, and the entry's input
    /// filter.
    pub fn detecting<C, F>(basis: &Listenable<C>, test: F) -> Self
    where
        C: Clone + Send + Sync + 'static,
        F: Fn(C, &TrialScope, Option<&T>) -> Option<TrialResult<R>> + Send + Sync + 'static,
    {
        Self::build(
            basis,
            move |raw: C, scope: &TrialScope, input: Option<&T>, _is_request: bool| {
                test(raw, scope, input)
            },
            None,
        )
    }

    /// Creates a requesting trial: a detecting trial with a *start* action.
    ///
    /// `test` additionally receives whether the entry under evaluation
    /// originated from an active request. `start` is invoked by a requester
    /// to provoke the condition; resolving to `Some` short-circuits the
    /// detection wait.
    pub fn requesting<C, F, S, Fut>(basis: &Listenable<C>, test: F, start: S) -> Self
    where
        C: Clone + Send + Sync + 'static,
        F: Fn(C, &TrialScope, Option<&T>, bool) -> Option<TrialResult<R>> + Send + Sync + 'static,
        S: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<R>> + Send + 'static,
    {
        Self::build(
            basis,
            test,
            Some(Arc::new(move |input| start(input).boxed()) as StartFn<T, R>),
        )
    }

    fn build<C, F>(basis: &Listenable<C>, test: F, start: Option<StartFn<T, R>>) -> Self
    where
        C: Clone + Send + Sync + 'static,
        F: Fn(C, &TrialScope, Option<&T>, bool) -> Option<TrialResult<R>> + Send + Sync + 'static,
    {
        let id = basis.id();
        let basis = basis.clone();
        let test = Arc::new(test);

        let source: SupplierSource<T, R> = Arc::new(move |token: CancellationToken| {
            let (tx, rx) = mpsc::unbounded_channel();
            // Subscribe before handing the stream back so firings published
            // right after enable are not missed.
            let mut raw = basis.subscribe();
            let basis_id = id;
            let test = Arc::clone(&test);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        next = raw.recv() => match next {
                            Ok(event) => {
                                let test = Arc::clone(&test);
                                let supplier = ResultSupplier::new(
                                    move |scope: &TrialScope, input: Option<&T>, is_request: bool| {
                                        test(event.clone(), scope, input, is_request)
                                    },
                                );
                                if tx.send(supplier).is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(basis = ?basis_id, skipped, "trial basis stream lagged; firings dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            });
            rx
        });

        Self {
            basis: id,
            source,
            start,
        }
    }

    /// Identity of the underlying signal source, used for entry affinity.
    pub fn basis(&self) -> SourceId {
        self.basis
    }

    /// Opens the supplier stream for one enable cycle.
    pub(crate) fn open(
        &self,
        token: CancellationToken,
    ) -> mpsc::UnboundedReceiver<ResultSupplier<T, R>> {
        (self.source)(token)
    }

    pub(crate) fn start_fn(&self) -> Option<StartFn<T, R>> {
        self.start.clone()
    }
}
