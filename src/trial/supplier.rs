//! # Result suppliers.
//!
//! A [`ResultSupplier`] is a one-shot unit of work bound to one firing of the
//! underlying raw signal: it closes over the raw context and, given a scope
//! and an optional input, attempts to produce a result.
//!
//! One supplier is created per firing and evaluated once per pending entry,
//! concurrently; it is therefore shared (`Arc`) and must stay read-only.

use std::sync::Arc;

use super::{TrialResult, TrialScope};

type SupplyFn<T, R> =
    dyn Fn(&TrialScope, Option<&T>, bool) -> Option<TrialResult<R>> + Send + Sync;

/// One-shot attempt unit produced by a trial for one firing.
pub struct ResultSupplier<T, R> {
    supply: Arc<SupplyFn<T, R>>,
}

impl<T, R> Clone for ResultSupplier<T, R> {
    fn clone(&self) -> Self {
        Self {
            supply: Arc::clone(&self.supply),
        }
    }
}

impl<T, R> ResultSupplier<T, R> {
    pub(crate) fn new(
        supply: impl Fn(&TrialScope, Option<&T>, bool) -> Option<TrialResult<R>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            supply: Arc::new(supply),
        }
    }

    /// Runs the attempt against one entry's view of this firing.
    ///
    /// `None` is the silent no-match outcome; it never surfaces as an error.
    pub fn supply(
        &self,
        scope: &TrialScope,
        input: Option<&T>,
        is_request: bool,
    ) -> Option<TrialResult<R>> {
        (self.supply)(scope, input, is_request)
    }
}

impl<T, R> std::fmt::Debug for ResultSupplier<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResultSupplier")
    }
}
