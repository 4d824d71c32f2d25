//! # Module handle: lifecycle state shared between a detector and its callers.
//!
//! A [`ModuleHandle`] tracks whether the owning component is enabled, which
//! parent modules it depends on, and how many callers are currently inside a
//! detection or request call.
//!
//! ## Lifecycle
//! ```text
//! enable():
//!   ├─► enable parents (extend() declarations), mark self as their dependent
//!   ├─► create a fresh cycle CancellationToken
//!   └─► run registered on-enable hooks with the cycle token
//!
//! disable():
//!   ├─► refused while other modules depend on this one
//!   ├─► cancel the cycle token → dispatch loops stop
//!   └─► release the dependent mark on each parent
//! ```
//!
//! ## Rules
//! - `enable()` is idempotent; hooks run only on the disabled→enabled
//!   transition.
//! - `assert_usable()` is fail-fast: using a disabled module is a programming
//!   error and panics immediately.
//! - Disabling does not tear down pending detection entries; their waits run
//!   into their own timeouts. Callers still inside the module are counted by
//!   [`ModuleHandle::users`] and a `disable()` under load is logged.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type EnableHook = Box<dyn Fn(CancellationToken) + Send + Sync>;

struct ModuleInner {
    name: Arc<str>,
    enabled: AtomicBool,
    users: AtomicUsize,
    dependents: AtomicUsize,
    parents: Mutex<Vec<ModuleHandle>>,
    hooks: Mutex<Vec<EnableHook>>,
    cycle: Mutex<Option<CancellationToken>>,
}

/// Shared lifecycle handle for one module.
///
/// Cheap to clone; clones observe and mutate the same state.
pub struct ModuleHandle {
    inner: Arc<ModuleInner>,
}

impl Clone for ModuleHandle {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.inner.name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl ModuleHandle {
    /// Creates a new, disabled module handle.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                name: name.into(),
                enabled: AtomicBool::new(false),
                users: AtomicUsize::new(0),
                dependents: AtomicUsize::new(0),
                parents: Mutex::new(Vec::new()),
                hooks: Mutex::new(Vec::new()),
                cycle: Mutex::new(None),
            }),
        }
    }

    /// Returns the module name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True while the module is inside an enable cycle.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Number of callers currently inside the module (live [`UsageGuard`]s).
    pub fn users(&self) -> usize {
        self.inner.users.load(Ordering::Acquire)
    }

    /// Number of enabled modules that declared this one as a parent.
    pub fn dependents(&self) -> usize {
        self.inner.dependents.load(Ordering::Acquire)
    }

    /// Declares `parents` as dependencies: they are enabled whenever this
    /// module enables, and cannot be disabled while this module is enabled.
    pub fn extend(&self, parents: &[ModuleHandle]) {
        let mut held = self
            .inner
            .parents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.extend(parents.iter().cloned());
    }

    /// Registers a hook to run on every disabled→enabled transition.
    ///
    /// The hook receives the cycle [`CancellationToken`]; work started by the
    /// hook must stop when the token is cancelled.
    pub fn on_enable(&self, hook: impl Fn(CancellationToken) + Send + Sync + 'static) {
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Enables the module, its parents first.
    ///
    /// Returns the fresh cycle token on the transition, or `None` if the
    /// module was already enabled.
    pub fn enable(&self) -> Option<CancellationToken> {
        if self.inner.enabled.swap(true, Ordering::AcqRel) {
            return None;
        }

        let parents = self
            .inner
            .parents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for parent in &parents {
            parent.enable();
            parent.inner.dependents.fetch_add(1, Ordering::AcqRel);
        }

        let token = CancellationToken::new();
        *self
            .inner
            .cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());

        debug!(module = %self.inner.name, "module enabled");
        let hooks = self
            .inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook(token.clone());
        }
        Some(token)
    }

    /// Disables the module and cancels its cycle token.
    ///
    /// Refused (returns `false`) while other enabled modules depend on this
    /// one. Pending detection entries are not torn down; their waits run into
    /// their own timeouts.
    pub fn disable(&self) -> bool {
        if self.dependents() > 0 {
            warn!(
                module = %self.inner.name,
                dependents = self.dependents(),
                "disable refused: module has enabled dependents"
            );
            return false;
        }
        if !self.inner.enabled.swap(false, Ordering::AcqRel) {
            return true;
        }

        let users = self.users();
        if users > 0 {
            warn!(module = %self.inner.name, users, "module disabled with callers still inside");
        }

        if let Some(token) = self
            .inner
            .cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }

        let parents = self
            .inner
            .parents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for parent in &parents {
            parent.inner.dependents.fetch_sub(1, Ordering::AcqRel);
        }

        debug!(module = %self.inner.name, "module disabled");
        true
    }

    /// Marks one caller as inside the module.
    ///
    /// # Panics
    /// Panics if the module is not enabled: calling into a disabled module is
    /// a programming error, not a recoverable condition.
    pub fn assert_usable(&self) -> UsageGuard {
        assert!(
            self.is_enabled(),
            "module '{}' used while disabled",
            self.inner.name
        );
        self.inner.users.fetch_add(1, Ordering::AcqRel);
        UsageGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// RAII marker for one caller inside a module.
///
/// Dropping the guard releases the usage count on every exit path, including
/// cancellation and panic unwinds.
pub struct UsageGuard {
    inner: Arc<ModuleInner>,
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        self.inner.users.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for UsageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageGuard")
            .field("module", &self.inner.name)
            .finish()
    }
}
