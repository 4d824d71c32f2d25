//! # Requester: a detector with an active start trigger.
//!
//! A [`Requester`] adds an active-request operation to the detection
//! machinery: `request()` may invoke the primary trial's *start* action to
//! provoke the awaited condition, then waits on the same entry/matching
//! machinery, bounded by the configured timeout and an externally supplied
//! lifecycle that cancels the request if it fires mid-flight.
//!
//! ## Request state machine
//! ```text
//! Created ──► Started ──► (racing: external detection | start result)
//!                              │
//!                              ├─► Resolved   (value delivered)
//!                              ├─► TimedOut   (diagnostic notice + error log)
//!                              └─► Cancelled  (lifecycle fired mid-flight)
//! ```
//!
//! ## Rules
//! - The active-request counter is decremented via RAII on **every** exit
//!   path, including cancellation.
//! - Cancellation beats a simultaneously-arriving match (biased race): a
//!   cancelled request never delivers a success value.
//! - The settling delay and the "start may already have the answer" shortcut
//!   tolerate actively-triggered signals arriving faster than the passive
//!   detection path can register its entry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::Config;
use crate::error::RequestError;
use crate::lifecycle::ModuleHandle;
use crate::listen::Listenable;
use crate::trial::{StartFn, Trial};

use super::detector::{Detector, Responses};

/// User-visible diagnostic published when a request times out.
///
/// The crate only publishes these; surrounding UI code subscribes via
/// [`Requester::timeouts`] and renders them (e.g. as a toast).
#[derive(Clone, Debug)]
pub struct RequestTimeout {
    /// Name of the requester that timed out.
    pub requester: Arc<str>,
    /// Rendered input of the failed request.
    pub input: Arc<str>,
    /// The configured request timeout.
    pub limit: Duration,
    /// Time actually spent before the request was abandoned.
    pub elapsed: Duration,
}

/// Resolves when the governing lifecycle next fires.
type LifecycleWatch = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// RAII active-request marker: decrements on every exit path.
struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A detector augmented with an active start trigger and timeout/lifecycle
/// bounded single-response request semantics.
///
/// Cheap to clone; clones share the same detector and counters.
pub struct Requester<T, R> {
    name: Arc<str>,
    detector: Detector<T, R>,
    start: Option<StartFn<T, R>>,
    lifecycle: LifecycleWatch,
    active: Arc<AtomicUsize>,
    timeouts: Listenable<RequestTimeout>,
}

impl<T, R> Clone for Requester<T, R> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            detector: self.detector.clone(),
            start: self.start.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            active: Arc::clone(&self.active),
            timeouts: self.timeouts.clone(),
        }
    }
}

impl<T, R> std::fmt::Debug for Requester<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("name", &self.name)
            .field("active", &self.active.load(Ordering::Acquire))
            .finish()
    }
}

impl<T, R> Requester<T, R>
where
    T: std::fmt::Debug + Clone + Send + Sync + 'static,
    R: std::fmt::Debug + Clone + Send + Sync + 'static,
{
    /// Creates a requester running via `primary` (whose start action, if any,
    /// is used to provoke the condition) and `secondary` trials.
    ///
    /// `lifecycle` defines the requester's lifecycle: if it fires during a
    /// request, the request is cancelled.
    pub fn new<E>(
        name: impl Into<Arc<str>>,
        lifecycle: &Listenable<E>,
        primary: Trial<T, R>,
        secondary: Vec<Trial<T, R>>,
        config: Config,
    ) -> Self
    where
        E: Clone + Send + 'static,
    {
        let name: Arc<str> = name.into();
        let start = primary.start_fn();

        let mut trials = Vec::with_capacity(1 + secondary.len());
        trials.push(primary);
        trials.extend(secondary);
        let detector = Detector::new(Arc::clone(&name), trials, config);

        let lifecycle = lifecycle.clone();
        let watch: LifecycleWatch = Arc::new(move || {
            let mut notifications = lifecycle.subscribe();
            async move {
                loop {
                    match notifications.recv().await {
                        // A lagged subscription still proves the lifecycle fired.
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => return,
                        Err(broadcast::error::RecvError::Closed) => {
                            futures::future::pending::<()>().await;
                        }
                    }
                }
            }
            .boxed()
        });

        Self {
            name,
            detector,
            start,
            lifecycle: watch,
            active: Arc::new(AtomicUsize::new(0)),
            timeouts: Listenable::new(16),
        }
    }

    /// One-shot active request.
    ///
    /// Registers a detection entry marked as a request, settles, invokes the
    /// start action if present, and races the detection channel against the
    /// configured timeout and the lifecycle.
    ///
    /// # Panics
    /// Panics if the requester's module is not enabled (programming error).
    pub async fn request(&self, input: T, hidden: bool) -> Result<R, RequestError> {
        let mut responses = self
            .detector
            .register(true, Some(input.clone()), None, hidden);
        let _active = ActiveGuard::enter(&self.active);

        let cancel = CancellationToken::new();
        let fired = (self.lifecycle)();
        let trip = cancel.clone();
        let watcher = tokio::spawn(async move {
            fired.await;
            trip.cancel();
        });

        let started = time::Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::Cancelled {
                reason: format!("{} requester lifecycle ended during a request", self.name),
            }),
            outcome = self.drive(&input, &mut responses, started) => outcome,
        };
        watcher.abort();
        outcome
    }

    async fn drive(
        &self,
        input: &T,
        responses: &mut Responses<R>,
        started: time::Instant,
    ) -> Result<R, RequestError> {
        // An immediate follow-up right after the raw signal can be dropped by
        // the underlying transport; let the pipeline settle first.
        time::sleep(self.detector.config().settle).await;

        if let Some(start) = &self.start {
            if let Some(value) = start(input.clone()).await {
                return Ok(value);
            }
        }

        let limit = self.detector.config().timeout;
        match time::timeout(limit, responses.matched()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(RequestError::Cancelled {
                reason: format!("{} requester dropped the detection entry", self.name),
            }),
            Err(_elapsed) => {
                let elapsed = started.elapsed();
                error!(
                    requester = %self.name,
                    input = ?input,
                    ?elapsed,
                    "request timed out after {limit:?}"
                );
                self.timeouts.publish(RequestTimeout {
                    requester: Arc::clone(&self.name),
                    input: format!("{input:?}").into(),
                    limit,
                    elapsed,
                });
                Err(RequestError::Timeout { limit, elapsed })
            }
        }
    }

    /// Number of requests currently in flight (observability).
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Diagnostic stream of request timeouts, for UI consumption.
    pub fn timeouts(&self) -> &Listenable<RequestTimeout> {
        &self.timeouts
    }

    /// The underlying detector.
    pub fn detector(&self) -> &Detector<T, R> {
        &self.detector
    }

    // --- Detector surface delegation ---

    /// See [`Detector::enable`].
    pub fn enable(&self) {
        self.detector.enable();
    }

    /// See [`Detector::disable`].
    pub fn disable(&self) {
        self.detector.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.detector.is_enabled()
    }

    /// See [`Detector::extend`].
    pub fn extend(&self, parents: &[ModuleHandle]) {
        self.detector.extend(parents);
    }

    /// See [`Detector::detect`].
    pub fn detect(&self, input: Option<T>, hidden: bool) -> Responses<R> {
        self.detector.detect(input, hidden)
    }

    /// See [`Detector::detect_once`].
    pub async fn detect_once(&self, input: Option<T>, hidden: bool) -> Option<R> {
        self.detector.detect_once(input, hidden).await
    }

    /// See [`Detector::notifications`].
    pub fn notifications(&self) -> broadcast::Receiver<R> {
        self.detector.notifications()
    }

    /// See [`Detector::previous`].
    pub fn previous(&self) -> Option<R> {
        self.detector.previous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialScope;

    type Raw = String;

    fn echo_requester(
        chat: &Listenable<Raw>,
        lifecycle: &Listenable<()>,
        start_value: Option<&'static str>,
        config: Config,
    ) -> Requester<String, String> {
        let trial = Trial::requesting(
            chat,
            |raw: Raw, scope: &TrialScope, _input: Option<&String>, is_request: bool| {
                scope.require(is_request)?;
                scope.instant(raw)
            },
            move |_input: String| async move { start_value.map(str::to_string) },
        );
        Requester::new("echo", lifecycle, trial, Vec::new(), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_shortcut_skips_detection_wait() {
        let chat = Listenable::new(8);
        let lifecycle = Listenable::new(1);
        let requester = echo_requester(&chat, &lifecycle, Some("already there"), Config::default());
        requester.enable();

        let value = requester.request("ping".to_string(), false).await.unwrap();
        assert_eq!(value, "already there");
        assert_eq!(requester.active_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_path_resolves_request() {
        let chat = Listenable::new(8);
        let lifecycle = Listenable::new(1);
        let requester = echo_requester(&chat, &lifecycle, None, Config::default());
        requester.enable();

        let publisher = chat.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            publisher.publish("pong".to_string());
        });

        let value = requester.request("ping".to_string(), false).await.unwrap();
        assert_eq!(value, "pong");
        assert_eq!(requester.active_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_notice_and_decrements_counter() {
        let chat = Listenable::new(8);
        let lifecycle = Listenable::new(1);
        let config = Config {
            timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let requester = echo_requester(&chat, &lifecycle, None, config.clone());
        requester.enable();
        let mut notices = requester.timeouts().subscribe();

        let err = requester
            .request("ping".to_string(), false)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        if let RequestError::Timeout { limit, elapsed } = &err {
            assert_eq!(*limit, config.timeout);
            assert!(*elapsed >= config.timeout);
        }
        assert_eq!(requester.active_requests(), 0);

        let notice = notices.recv().await.unwrap();
        assert_eq!(&*notice.requester, "echo");
        assert!(notice.elapsed >= notice.limit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_cancellation_beats_late_match() {
        let chat: Listenable<Raw> = Listenable::new(8);
        let lifecycle: Listenable<()> = Listenable::new(1);
        let requester = echo_requester(&chat, &lifecycle, None, Config::default());
        requester.enable();

        let in_flight = {
            let requester = requester.clone();
            tokio::spawn(async move { requester.request("ping".to_string(), false).await })
        };

        // Let the request pass its settling delay and reach the wait.
        time::sleep(Duration::from_millis(100)).await;
        lifecycle.publish(());
        chat.publish("pong".to_string());

        let outcome = in_flight.await.unwrap();
        let err = outcome.unwrap_err();
        assert!(err.is_cancelled(), "got {err:?}");
        assert_eq!(requester.active_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_entry_is_marked_as_request() {
        let chat: Listenable<Raw> = Listenable::new(8);
        let lifecycle: Listenable<()> = Listenable::new(1);
        let trial = Trial::requesting(
            &chat,
            |raw: Raw, scope: &TrialScope, _input: Option<&String>, is_request: bool| {
                // Passive entries must not see request-only results.
                if is_request {
                    scope.instant(raw)
                } else {
                    scope.fail::<String>()
                }
            },
            |_input: String| async move { None },
        );
        let requester: Requester<String, String> =
            Requester::new("marked", &lifecycle, trial, Vec::new(), Config::default());
        requester.enable();

        let mut passive = requester.detect(None, false);
        let publisher = chat.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            publisher.publish("pong".to_string());
        });

        let value = requester.request("ping".to_string(), false).await.unwrap();
        assert_eq!(value, "pong");
        // The passive entry saw the firing only as a no-match.
        assert_eq!(passive.next_raw().await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_trial_result_feeds_request() {
        let chat: Listenable<Raw> = Listenable::new(8);
        let lifecycle: Listenable<()> = Listenable::new(1);
        let trial = Trial::requesting(
            &chat,
            |raw: Raw, scope: &TrialScope, _input: Option<&String>, _is_request: bool| {
                scope.defer(async move {
                    time::sleep(Duration::from_millis(10)).await;
                    Some(raw)
                })
            },
            |_input: String| async move { None },
        );
        let requester: Requester<String, String> =
            Requester::new("deferred", &lifecycle, trial, Vec::new(), Config::default());
        requester.enable();

        let publisher = chat.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            publisher.publish("late pong".to_string());
        });

        let value = requester.request("ping".to_string(), false).await.unwrap();
        assert_eq!(value, "late pong");
    }
}
