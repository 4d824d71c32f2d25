//! # sigtrial
//!
//! **sigtrial** is a trial-based detection and request-correlation engine for
//! noisy asynchronous signal sources.
//!
//! It turns low-level, racy signals (chat lines, packets, inventory updates)
//! into high-level, reliable detected events and request/response
//! interactions, with deduplication, timeout, and cancellation guarantees.
//! The crate is designed as a building block for clients that sit on top of
//! an opaque event-driven transport.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ Listenable A │   │ Listenable B │   │ Listenable C │
//!     │ (raw signal) │   │ (raw signal) │   │ (raw signal) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Trial #1   │   │   Trial #2   │   │   Trial #3   │
//!     │ (suppliers)  │   │ (suppliers)  │   │ (suppliers)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Detector (per-module correlation core)                           │
//! │  - EntryTable (pending callers, scan-with-prune)                  │
//! │  - Firing gate (compare-and-set single winner per firing)         │
//! │  - StateListenable (hot notifications + durable latest value)     │
//! │  - ModuleHandle (enable/disable, dependents, usage assertion)     │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   detect(input)      request(input)    notifications / previous
//!   (passive stream)   (Requester only)  (hot shared view)
//! ```
//!
//! ### One firing
//! ```text
//! raw value ──► ResultSupplier ──► dispatch loop
//!   │
//!   ├─ entry table empty ──► default entry (ambient detection)
//!   └─ else: one evaluation task per open matching entry, all racing
//!        │
//!        ├─ no-match  → entry receives None, stays eligible
//!        └─ success   → entry receives its value
//!                       + Firing::try_win (exactly one winner)
//!                            │
//!                            ▼
//!                     notifications.publish(winner)
//!                     cancel this firing's remaining evaluations
//! ```
//!
//! ## Components
//! | Area            | Description                                                   | Key types                                  |
//! |-----------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Signals**     | Hot broadcast streams and the durable latest-value view.      | [`Listenable`], [`StateListenable`]        |
//! | **Trials**      | Wrap raw signals into streams of one-shot attempt units.      | [`Trial`], [`ResultSupplier`], [`TrialScope`] |
//! | **Detection**   | Match firings against pending entries, publish winners.       | [`Detector`], [`Responses`]                |
//! | **Requests**    | Actively provoke a condition, bounded by timeout/lifecycle.   | [`Requester`], [`RequestError`]            |
//! | **Lifecycle**   | Enable/disable cycles, dependencies, usage assertion.         | [`ModuleHandle`], [`UsageGuard`]           |
//! | **Observers**   | Isolated consumers of the notification stream.                | [`Observe`], [`TraceObserver`]             |
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//! use sigtrial::{Config, Detector, Listenable, Trial, TrialScope};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // Raw signal source: chat lines as they arrive from the transport.
//!     let chat: Listenable<String> = Listenable::new(64);
//!
//!     // Wrap it into a trial: each line is tested against the caller's input.
//!     let trial = Trial::detecting(
//!         &chat,
//!         |line: String, scope: &TrialScope, input: Option<&String>| {
//!             scope.require(input.map_or(true, |needle| line.contains(needle.as_str())))?;
//!             scope.instant(line)
//!         },
//!     );
//!
//!     let joins: Detector<String, String> =
//!         Detector::new("join message", vec![trial], Config::default());
//!     joins.enable();
//!
//!     // Somewhere else, the transport publishes lines.
//!     let publisher = chat.clone();
//!     tokio::spawn(async move {
//!         publisher.publish("Alice joined the game".to_string());
//!     });
//!
//!     // Ad-hoc detection bounded by a timeout; absence is not an error.
//!     let seen = joins
//!         .detect_within(Some("joined".to_string()), false, Duration::from_secs(1))
//!         .await;
//!     println!("seen: {seen:?}");
//! }
//! ```

mod config;
mod detect;
mod error;
mod lifecycle;
mod listen;
mod observe;
mod trial;

// ---- Public re-exports ----

pub use config::Config;
pub use detect::{Detector, RequestTimeout, Requester, Responses};
pub use error::RequestError;
pub use lifecycle::{ModuleHandle, UsageGuard};
pub use listen::{Listenable, SourceId, StateListenable};
pub use observe::{spawn_observer, Observe, TraceObserver};
pub use trial::{ResultSupplier, Trial, TrialResult, TrialScope};
