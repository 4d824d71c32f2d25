//! Error types produced by active requests.
//!
//! Only requests can fail: a no-match is silent (a `None` response to the
//! specific entry) and an ad-hoc detection timeout is reported as an absence.
//! [`RequestError`] covers the two ways a request itself ends without a
//! value. Helper methods (`as_label`, `as_message`) are provided for
//! logging/metrics.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by an active request.
///
/// Contained per request: a failing request does not affect other concurrent
/// requests or the detector's notification stream.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RequestError {
    /// The bounded wait for a matching result elapsed.
    #[error("request timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// The configured request timeout.
        limit: Duration,
        /// Time actually spent in the request before it was abandoned.
        elapsed: Duration,
    },

    /// The governing lifecycle fired before the request resolved.
    #[error("request cancelled: {reason}")]
    Cancelled {
        /// Human-readable cancellation reason.
        reason: String,
    },
}

impl RequestError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use sigtrial::RequestError;
    ///
    /// let err = RequestError::Timeout {
    ///     limit: Duration::from_secs(5),
    ///     elapsed: Duration::from_secs(5),
    /// };
    /// assert_eq!(err.as_label(), "request_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RequestError::Timeout { .. } => "request_timeout",
            RequestError::Cancelled { .. } => "request_cancelled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RequestError::Timeout { limit, elapsed } => {
                format!("timeout: waited {elapsed:?} of allowed {limit:?}")
            }
            RequestError::Cancelled { reason } => format!("cancelled: {reason}"),
        }
    }

    /// True for [`RequestError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    /// True for [`RequestError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let timeout = RequestError::Timeout {
            limit: Duration::from_secs(1),
            elapsed: Duration::from_secs(2),
        };
        let cancelled = RequestError::Cancelled {
            reason: "lifecycle ended".into(),
        };

        assert_eq!(timeout.as_label(), "request_timeout");
        assert_eq!(cancelled.as_label(), "request_cancelled");
        assert!(timeout.is_timeout() && !timeout.is_cancelled());
        assert!(cancelled.is_cancelled() && !cancelled.is_timeout());
    }
}
