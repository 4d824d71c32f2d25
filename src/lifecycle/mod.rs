//! Module lifecycle: enable/disable cycles, dependency declaration, and
//! usage assertion.
//!
//! Detectors and requesters are owned by modules that can be enabled and
//! disabled by the surrounding application. This module provides the handle
//! type they use:
//! - [`ModuleHandle`] shared lifecycle state with per-cycle cancellation
//! - [`UsageGuard`] RAII usage marker returned by
//!   [`ModuleHandle::assert_usable`]

mod module;

pub use module::{ModuleHandle, UsageGuard};
