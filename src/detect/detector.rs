//! # Detector: matches trial firings against pending entries.
//!
//! A [`Detector`] owns zero or more trials and the entry table. For every
//! firing of a trial's underlying signal it evaluates all pending matching
//! entries concurrently, enforces single-winner semantics through the firing
//! gate, and republishes the winning result as a durable latest-value
//! notification stream.
//!
//! ## Firing flow
//! ```text
//! raw signal ──► trial forwarder ──► dispatch loop (one per trial)
//!                                         │ handle_firing()
//!              ┌──────────────────────────┴───────────────┐
//!              │ scan-with-prune entry table              │
//!              │   empty → synthesize the default entry   │
//!              ▼                                          ▼
//!        [eval task E1]  [eval task E2]  ...  [eval task EN]   (racing)
//!              │               │                   │
//!              │ no-match → respond(None), entry stays eligible
//!              │ success  → respond(value) + Firing::try_win(value)
//!              ▼
//!        completion watcher ──► notifications.publish(winner)
//!                           └─► cancel this firing's remaining evaluations
//! ```
//!
//! ## Rules
//! - An evaluation never blocks the dispatch loop; each runs as its own
//!   cancellable task.
//! - At most one evaluation wins a firing; the notification stream emits at
//!   most once per firing.
//! - Panics inside an attempt (sync body or deferred work) are contained at
//!   the evaluation boundary and converted to no-match plus an error trace.
//! - Entries are not retired by a no-match; they stay eligible for later
//!   firings until their sink closes.
//! - A resolved firing cancels only its own losing evaluations, never those
//!   of other firings.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::config::Config;
use crate::lifecycle::{ModuleHandle, UsageGuard};
use crate::listen::{SourceId, StateListenable};
use crate::trial::{ResultSupplier, Trial, TrialResult, TrialScope};

use super::entry::{Entry, EntryTable};
use super::firing::Firing;

/// Renders a panic payload the way it is usually thrown: as a message.
pub(crate) fn panic_reason(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) struct DetectorInner<T, R> {
    name: Arc<str>,
    trials: Vec<Trial<T, R>>,
    entries: EntryTable<T, R>,
    event: StateListenable<R>,
    module: ModuleHandle,
    config: Config,
}

/// Matches firings against pending entries and publishes a durable
/// latest-value notification stream.
///
/// Cheap to clone; clones share the same entry table, trials, and module.
pub struct Detector<T, R> {
    inner: Arc<DetectorInner<T, R>>,
}

impl<T, R> Clone for Detector<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R> std::fmt::Debug for Detector<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("name", &self.inner.name)
            .field("enabled", &self.inner.module.is_enabled())
            .finish()
    }
}

impl<T, R> Detector<T, R>
where
    T: std::fmt::Debug + Send + Sync + 'static,
    R: std::fmt::Debug + Clone + Send + Sync + 'static,
{
    /// Creates a detector running via `trials`.
    ///
    /// `name` names what is being detected (used in diagnostics only).
    pub fn new(name: impl Into<Arc<str>>, trials: Vec<Trial<T, R>>, config: Config) -> Self {
        let name = name.into();
        let module = ModuleHandle::new(format!("{name} detection"));
        let inner = Arc::new(DetectorInner {
            name,
            trials,
            entries: EntryTable::new(),
            event: StateListenable::new(config.notify_capacity_clamped()),
            module: module.clone(),
            config,
        });

        let weak = Arc::downgrade(&inner);
        module.on_enable(move |token| {
            if let Some(inner) = weak.upgrade() {
                DetectorInner::spawn_loops(&inner, token);
            }
        });

        Detector { inner }
    }

    /// Name of what is being detected.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The owning module's lifecycle handle.
    pub fn module(&self) -> &ModuleHandle {
        &self.inner.module
    }

    /// Declares `parents` as module dependencies (see
    /// [`ModuleHandle::extend`]).
    pub fn extend(&self, parents: &[ModuleHandle]) {
        self.inner.module.extend(parents);
    }

    /// Enables the module and starts one dispatch loop per trial.
    ///
    /// Must be called from within a Tokio runtime. Idempotent.
    pub fn enable(&self) {
        self.inner.module.enable();
    }

    /// Disables the module; dispatch loops stop, pending callers run into
    /// their own timeouts.
    pub fn disable(&self) {
        self.inner.module.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.module.is_enabled()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Begins waiting for matching results: registers a new entry and
    /// returns its per-call response stream.
    ///
    /// The entry retires lazily once the returned handle is dropped.
    ///
    /// # Panics
    /// Panics if the detector's module is not enabled (programming error).
    pub fn detect(&self, input: Option<T>, hidden: bool) -> Responses<R> {
        self.register(false, input, None, hidden)
    }

    /// Like [`Detector::detect`], but pins the entry to firings of one basis.
    pub fn detect_on(&self, input: Option<T>, basis: SourceId, hidden: bool) -> Responses<R> {
        self.register(false, input, Some(basis), hidden)
    }

    pub(crate) fn register(
        &self,
        is_request: bool,
        input: Option<T>,
        basis: Option<SourceId>,
        hidden: bool,
    ) -> Responses<R> {
        let usage = self.inner.module.assert_usable();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .entries
            .insert(Entry::new(is_request, input, basis, hidden, tx));
        Responses {
            responses: rx,
            _usage: usage,
        }
    }

    /// One-shot detection bounded by the configured timeout.
    ///
    /// Returns `None` on timeout — absence is not an error.
    pub async fn detect_once(&self, input: Option<T>, hidden: bool) -> Option<R> {
        let limit = self.inner.config.timeout;
        self.detect_within(input, hidden, limit).await
    }

    /// One-shot detection bounded by `limit`.
    pub async fn detect_within(
        &self,
        input: Option<T>,
        hidden: bool,
        limit: Duration,
    ) -> Option<R> {
        let mut responses = self.detect(input, hidden);
        time::timeout(limit, responses.matched()).await.ok().flatten()
    }

    /// Attempt-count-bounded detection: consumes up to `attempts` responses
    /// (each wait bounded by the configured timeout) and returns the first
    /// match, or `None` when the attempts are exhausted.
    pub async fn check_next(&self, input: Option<T>, hidden: bool, attempts: u32) -> Option<R> {
        let mut responses = self.detect(input, hidden);
        let per_attempt = self.inner.config.timeout;
        for _ in 0..attempts {
            match time::timeout(per_attempt, responses.next_raw()).await {
                Ok(Some(Some(value))) => return Some(value),
                Ok(Some(None)) => continue,
                Ok(None) => return None,
                Err(_elapsed) => continue,
            }
        }
        None
    }

    /// Subscribes to the hot notification stream of winning results.
    pub fn notifications(&self) -> broadcast::Receiver<R> {
        self.inner.event.subscribe()
    }

    /// The most recent winning result, visible to late subscribers.
    pub fn previous(&self) -> Option<R> {
        self.inner.event.previous()
    }

    /// Identity of the notification stream, usable as a basis for other
    /// detectors layered on top of this one.
    pub fn source_id(&self) -> SourceId {
        self.inner.event.id()
    }
}

impl<T, R> DetectorInner<T, R>
where
    T: std::fmt::Debug + Send + Sync + 'static,
    R: std::fmt::Debug + Clone + Send + Sync + 'static,
{
    fn spawn_loops(this: &Arc<Self>, token: CancellationToken) {
        for (index, trial) in this.trials.iter().enumerate() {
            let mut suppliers = trial.open(token.child_token());
            let basis = trial.basis();
            let me = Arc::clone(this);
            let loop_token = token.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = loop_token.cancelled() => break,
                        next = suppliers.recv() => match next {
                            Some(supplier) => Self::handle_firing(&me, index, basis, supplier),
                            None => break,
                        }
                    }
                }
            });
        }
    }

    /// Dispatches one firing: spawns the racing evaluation tasks and the
    /// completion watcher. Never awaits.
    fn handle_firing(
        this: &Arc<Self>,
        trial_index: usize,
        basis: SourceId,
        supplier: ResultSupplier<T, R>,
    ) {
        let (firing, resolved) = Firing::new();
        let siblings = CancellationToken::new();
        let scan = this.entries.scan(basis);

        if scan.ambient {
            // Nobody asked; the module still wants to notice and publish.
            Self::spawn_evaluation(this, trial_index, None, &supplier, &firing, &siblings);
        } else {
            for entry in scan.matching {
                Self::spawn_evaluation(this, trial_index, Some(entry), &supplier, &firing, &siblings);
            }
        }

        let me = Arc::clone(this);
        tokio::spawn(async move {
            if let Ok(value) = resolved.await {
                debug!(detector = %me.name, value = ?value, "firing succeeded; publishing");
                me.event.publish(value);
            }
            // Resolution (or exhaustion) ends this firing's remaining
            // evaluations; other firings are untouched.
            siblings.cancel();
        });
    }

    fn spawn_evaluation(
        this: &Arc<Self>,
        trial_index: usize,
        entry: Option<Arc<Entry<T, R>>>,
        supplier: &ResultSupplier<T, R>,
        firing: &Arc<Firing<R>>,
        siblings: &CancellationToken,
    ) {
        let me = Arc::clone(this);
        let supplier = supplier.clone();
        let firing = Arc::clone(firing);
        let siblings = siblings.clone();

        tokio::spawn(async move {
            let scope = TrialScope::new(entry.as_ref().map_or(false, |e| e.hidden));
            let is_request = entry.as_ref().map_or(false, |e| e.is_request);
            let target = me.describe(entry.as_deref());
            debug!(detector = %me.name, trial = trial_index, "trial started for {target}");

            let attempt = std::panic::catch_unwind(AssertUnwindSafe(|| {
                supplier.supply(&scope, entry.as_ref().and_then(|e| e.input.as_ref()), is_request)
            }));

            // Outer None: ended by sibling cancellation, deliver nothing
            // further. Inner Option is the attempt's own outcome.
            let outcome: Option<Option<R>> = match attempt {
                Err(panic) => {
                    error!(
                        detector = %me.name,
                        trial = trial_index,
                        reason = %panic_reason(panic),
                        "attempt panicked; treated as no-match"
                    );
                    Some(None)
                }
                Ok(None) => Some(None),
                Ok(Some(TrialResult::Instant(value))) => Some(Some(value)),
                Ok(Some(TrialResult::Deferred(work))) => {
                    tokio::select! {
                        biased;
                        _ = siblings.cancelled() => None,
                        finished = AssertUnwindSafe(work).catch_unwind() => match finished {
                            Ok(value) => Some(value),
                            Err(panic) => {
                                error!(
                                    detector = %me.name,
                                    trial = trial_index,
                                    reason = %panic_reason(panic),
                                    "deferred attempt panicked; treated as no-match"
                                );
                                Some(None)
                            }
                        }
                    }
                }
            };

            match outcome {
                None => trace!(detector = %me.name, trial = trial_index, "trial cancelled for {target}"),
                Some(None) => {
                    if let Some(entry) = &entry {
                        entry.respond(None);
                    }
                    trace!(detector = %me.name, trial = trial_index, "trial ended without result for {target}");
                }
                Some(Some(value)) => {
                    if let Some(entry) = &entry {
                        entry.respond(Some(value.clone()));
                    }
                    firing.try_win(value);
                    trace!(detector = %me.name, trial = trial_index, "trial ended for {target}");
                }
            }
        });
    }

    fn describe(&self, entry: Option<&Entry<T, R>>) -> String {
        let (hidden, input) = match entry {
            None => (false, None),
            Some(entry) => (entry.hidden, entry.input.as_ref()),
        };
        let hidden = if hidden { "hidden " } else { "" };
        match input {
            Some(input) => format!("{} ({hidden}explicit entry with input {input:?})", self.name),
            None => format!("{} ({hidden}default entry)", self.name),
        }
    }
}

/// Per-call response stream of one detection entry.
///
/// Dropping the handle closes the entry's sink; the detector prunes the entry
/// on its next firing scan.
pub struct Responses<R> {
    responses: mpsc::UnboundedReceiver<Option<R>>,
    _usage: UsageGuard,
}

impl<R> Responses<R> {
    /// Next raw response: `Some(None)` is a no-match marker for one firing,
    /// `None` means the detector dropped the entry.
    pub async fn next_raw(&mut self) -> Option<Option<R>> {
        self.responses.recv().await
    }

    /// Next matched result, skipping no-match markers. `None` means the
    /// detector dropped the entry.
    pub async fn matched(&mut self) -> Option<R> {
        while let Some(response) = self.responses.recv().await {
            if let Some(value) = response {
                return Some(value);
            }
        }
        None
    }
}

impl<R> std::fmt::Debug for Responses<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Responses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::Listenable;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Detector with one trial that succeeds when the raw line equals the
    /// entry's input (or any line for the default entry).
    fn line_detector(chat: &Listenable<String>, config: Config) -> Detector<String, String> {
        init_tracing();
        let trial = Trial::detecting(
            chat,
            |raw: String, scope: &TrialScope, input: Option<&String>| {
                scope.require(input.map_or(true, |want| *want == raw))?;
                scope.instant(raw)
            },
        );
        Detector::new("line", vec![trial], config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambient_firing_publishes_once() {
        let chat = Listenable::new(8);
        let detector = line_detector(&chat, Config::default());
        detector.enable();
        let mut notifications = detector.notifications();

        chat.publish("hello".to_string());
        let seen = time::timeout(Duration::from_secs(1), notifications.recv())
            .await
            .expect("notification")
            .unwrap();
        assert_eq!(seen, "hello");
        assert_eq!(detector.previous(), Some("hello".to_string()));

        // Exactly one notification for the one firing.
        assert!(
            time::timeout(Duration::from_millis(100), notifications.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_keep_entry_eligible() {
        let chat = Listenable::new(8);
        let detector = line_detector(&chat, Config::default());
        detector.enable();

        let mut responses = detector.detect(Some("ok".to_string()), false);
        for line in ["miss", "miss again", "ok"] {
            chat.publish(line.to_string());
        }

        assert_eq!(responses.next_raw().await, Some(None));
        assert_eq!(responses.next_raw().await, Some(None));
        assert_eq!(responses.next_raw().await, Some(Some("ok".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_next_recovers_within_attempt_bound() {
        let chat = Listenable::new(8);
        let detector = line_detector(&chat, Config::default());
        detector.enable();

        let publisher = chat.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            for line in ["miss", "miss again", "ok"] {
                publisher.publish(line.to_string());
            }
        });

        let found = detector.check_next(Some("ok".to_string()), false, 3).await;
        assert_eq!(found, Some("ok".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_filters_do_not_cross_deliver() {
        let chat = Listenable::new(8);
        let detector = line_detector(&chat, Config::default());
        detector.enable();

        let mut wants_a = detector.detect(Some("a".to_string()), false);
        let mut wants_b = detector.detect(Some("b".to_string()), false);

        chat.publish("a".to_string());

        assert_eq!(wants_a.matched().await, Some("a".to_string()));
        // The same firing only ever reaches the other entry as a no-match.
        assert_eq!(wants_b.next_raw().await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_once_times_out_to_none() {
        let chat = Listenable::new(8);
        let config = Config {
            timeout: Duration::from_millis(100),
            ..Config::default()
        };
        let detector = line_detector(&chat, config);
        detector.enable();

        assert_eq!(detector.detect_once(None, false).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_panic_is_contained() {
        let chat: Listenable<String> = Listenable::new(8);
        let trial = Trial::detecting(
            &chat,
            |raw: String, scope: &TrialScope, _input: Option<&String>| {
                assert!(raw != "boom", "supplier blew up");
                scope.instant(raw)
            },
        );
        let detector: Detector<String, String> =
            Detector::new("fragile", vec![trial], Config::default());
        detector.enable();

        let mut responses = detector.detect(None, false);
        chat.publish("boom".to_string());
        chat.publish("fine".to_string());

        assert_eq!(responses.next_raw().await, Some(None));
        assert_eq!(responses.matched().await, Some("fine".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_flag_reaches_the_scope() {
        let chat: Listenable<String> = Listenable::new(8);
        let trial = Trial::detecting(&chat, |_raw, scope: &TrialScope, _input: Option<&String>| {
            scope.instant(scope.hidden())
        });
        let detector: Detector<String, bool> =
            Detector::new("visibility", vec![trial], Config::default());
        detector.enable();

        let mut responses = detector.detect(None, true);
        chat.publish("line".to_string());
        assert_eq!(responses.matched().await, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_dispatch() {
        let chat = Listenable::new(8);
        let detector = line_detector(&chat, Config::default());
        detector.enable();
        let mut notifications = detector.notifications();

        detector.disable();
        chat.publish("late".to_string());
        assert!(
            time::timeout(Duration::from_millis(100), notifications.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    #[should_panic(expected = "used while disabled")]
    async fn test_detect_on_disabled_module_is_fatal() {
        let chat = Listenable::new(8);
        let detector = line_detector(&chat, Config::default());
        let _responses = detector.detect(None, false);
    }
}
