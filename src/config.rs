//! # Detection runtime configuration.
//!
//! Provides [`Config`], the per-detector settings bundle.
//!
//! Config is used in two ways:
//! 1. **Detector creation**: `Detector::new(name, trials, config)`
//! 2. **Requester creation**: `Requester::new(name, lifecycle, primary, secondary, config)`
//!
//! ## Sentinel values
//! - `notify_capacity = 0` → clamped to 1 by the notification stream.

use std::time::Duration;

/// Settings for one detector or requester.
///
/// Defines:
/// - **Bounded waits**: the timeout for ad-hoc detection and active requests
/// - **Transport settling**: the delay applied before a request's start action
/// - **Notification stream**: ring-buffer capacity for the latest-value view
///
/// ## Field semantics
/// - `timeout`: per-wait bound; ad-hoc detection returns `None` past it,
///   active requests fail with a timeout error.
/// - `settle`: short fixed delay before invoking a trial's start action; an
///   immediate follow-up right after the raw signal can be dropped by the
///   underlying transport.
/// - `notify_capacity`: notification broadcast ring size (min 1; clamped).
#[derive(Clone, Debug)]
pub struct Config {
    /// Bound for ad-hoc detection waits and active requests.
    pub timeout: Duration,

    /// Settling delay applied before a request invokes the start action.
    pub settle: Duration,

    /// Capacity of the notification broadcast ring buffer.
    ///
    /// Slow subscribers that lag behind more than `notify_capacity` values
    /// observe `Lagged` and skip older items.
    pub notify_capacity: usize,
}

impl Config {
    /// Returns the notification capacity clamped to a minimum of 1.
    #[inline]
    pub fn notify_capacity_clamped(&self) -> usize {
        self.notify_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `timeout = 5s` (generous bound for chat/packet round trips)
    /// - `settle = 50ms` (transport settling window)
    /// - `notify_capacity = 64`
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            settle: Duration::from_millis(50),
            notify_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.settle, Duration::from_millis(50));
        assert_eq!(cfg.notify_capacity, 64);
    }

    #[test]
    fn test_notify_capacity_is_clamped() {
        let cfg = Config {
            notify_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.notify_capacity_clamped(), 1);
    }
}
