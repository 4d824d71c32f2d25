//! Signal streams: hot broadcast listenables and the durable latest-value view.
//!
//! This module groups the primitives every other part of the crate is wired
//! with:
//! - [`SourceId`] process-unique identity of a signal source
//! - [`Listenable`] thin publish/subscribe wrapper over `tokio::sync::broadcast`
//! - [`StateListenable`] a listenable plus a durable "latest value" cell
//!
//! ## Quick reference
//! - **Publishers**: raw signal adapters (outside this crate), detector firing
//!   watchers, requester timeout diagnostics.
//! - **Consumers**: trial forwarder tasks, notification subscribers, late
//!   readers of [`StateListenable::previous`].

mod listenable;
mod state;

pub use listenable::{Listenable, SourceId};
pub use state::StateListenable;
