//! Notification observers: isolated consumers of a detector's results.
//!
//! An [`Observe`] implementation is driven by a dedicated worker task fed by
//! the detector's notification stream. Observers may be slow; they never
//! block the detector, and panics inside an observer are contained.

mod observer;

pub use observer::{spawn_observer, Observe, TraceObserver};
