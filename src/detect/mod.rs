//! Detection core: entry table, firing gate, detector and requester.
//!
//! This module contains the correlation machinery:
//! - [`entry`]: pending caller registrations and the concurrent entry table;
//! - [`firing`]: the per-firing single-winner gate;
//! - [`detector`]: matches firings against entries, publishes notifications;
//! - [`requester`]: detector plus an active start trigger with
//!   timeout/lifecycle-bounded request semantics.
//!
//! See `lib.rs` for the system-level wiring diagram.

mod detector;
mod entry;
mod firing;
mod requester;

pub use detector::{Detector, Responses};
pub use requester::{RequestTimeout, Requester};

pub(crate) use detector::panic_reason;
