//! # Attempt control flow.
//!
//! An attempt body receives a [`TrialScope`] and returns
//! `Option<TrialResult<R>>`: `None` means "no result", the silent no-match
//! outcome that never escapes the evaluation boundary as an error.
//!
//! The helpers compose with `?`:
//! ```
//! use sigtrial::{TrialResult, TrialScope};
//!
//! fn attempt(scope: &TrialScope, line: &str) -> Option<TrialResult<String>> {
//!     scope.require(line.starts_with("> "))?;
//!     scope.instant(line[2..].to_string())
//! }
//! # let scope = TrialScope::anonymous();
//! # assert!(attempt(&scope, "plain chat").is_none());
//! # assert!(attempt(&scope, "> joined").is_some());
//! ```

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Successful outcome of an attempt: either a value produced immediately or
/// asynchronous work that resolves to one later.
pub enum TrialResult<R> {
    /// The attempt produced its value synchronously.
    Instant(R),
    /// The attempt scheduled asynchronous work; resolving to `None` counts as
    /// no-match, and panics inside the work are contained the same way.
    Deferred(BoxFuture<'static, Option<R>>),
}

impl<R> std::fmt::Debug for TrialResult<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrialResult::Instant(_) => f.write_str("TrialResult::Instant"),
            TrialResult::Deferred(_) => f.write_str("TrialResult::Deferred"),
        }
    }
}

/// Execution context of one attempt.
#[derive(Debug, Clone, Copy)]
pub struct TrialScope {
    hidden: bool,
}

impl TrialScope {
    pub(crate) fn new(hidden: bool) -> Self {
        Self { hidden }
    }

    /// A scope outside any entry: not hidden. Intended for attempt bodies
    /// exercised directly in tests.
    pub fn anonymous() -> Self {
        Self::new(false)
    }

    /// Whether the matched entry asked for the raw side effect behind this
    /// firing to be suppressed (`false` for the default entry).
    ///
    /// Collaborators read this to decide e.g. whether a chat line should be
    /// marked as already consumed.
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Precondition guard; compose with `?` to abort the attempt when `cond`
    /// is false, without running the rest of the body.
    pub fn require(&self, cond: bool) -> Option<()> {
        cond.then_some(())
    }

    /// Aborts this attempt with no result. Sibling attempts are unaffected.
    pub fn fail<R>(&self) -> Option<TrialResult<R>> {
        None
    }

    /// Succeeds immediately with `value`.
    pub fn instant<R>(&self, value: R) -> Option<TrialResult<R>> {
        Some(TrialResult::Instant(value))
    }

    /// Schedules asynchronous work; the attempt resolves when it completes.
    /// The work resolving to `None` is equivalent to [`TrialScope::fail`].
    pub fn defer<R, F>(&self, work: F) -> Option<TrialResult<R>>
    where
        F: Future<Output = Option<R>> + Send + 'static,
    {
        Some(TrialResult::Deferred(work.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gated(scope: &TrialScope, open: bool) -> Option<TrialResult<u8>> {
        scope.require(open)?;
        scope.instant(7)
    }

    #[test]
    fn test_require_aborts_attempt() {
        let scope = TrialScope::anonymous();
        assert!(gated(&scope, false).is_none());
        assert!(matches!(gated(&scope, true), Some(TrialResult::Instant(7))));
    }

    #[test]
    fn test_fail_is_no_result() {
        let scope = TrialScope::anonymous();
        assert!(scope.fail::<u8>().is_none());
    }

    #[tokio::test]
    async fn test_defer_resolves_later() {
        let scope = TrialScope::anonymous();
        let result = scope.defer(async { Some(41 + 1) });
        match result {
            Some(TrialResult::Deferred(fut)) => assert_eq!(fut.await, Some(42)),
            other => panic!("expected deferred result, got {other:?}"),
        }
    }
}
