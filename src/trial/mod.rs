//! Trials: wrapped low-level signal sources producing result suppliers.
//!
//! A trial turns one raw signal stream into a stream of one-shot attempt
//! units that a detector evaluates against its pending entries:
//! - [`TrialScope`] / [`TrialResult`] control flow available inside an attempt
//! - [`ResultSupplier`] one-shot unit of work bound to one firing
//! - [`Trial`] the immutable descriptor a detector is built from

mod scope;
mod supplier;
mod trial;

pub use scope::{TrialResult, TrialScope};
pub use supplier::ResultSupplier;
pub use trial::Trial;

pub(crate) use trial::StartFn;
