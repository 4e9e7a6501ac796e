//! Observable view of the currently visible codes.
//!
//! The reconciler publishes its whole tracked set after every batch; readers
//! always see one complete snapshot, never a half-applied update. Listeners
//! get a single "reset" notification per publish that actually changed the
//! set, with the new snapshot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::panic_message;
use crate::reconcile::TrackedCode;

/// Callback invoked with the new snapshot after the visible set changed.
pub type ViewChangedCallback = Box<dyn Fn(&[TrackedCode]) + Send + Sync>;

struct ViewInner {
    snapshot: RwLock<Arc<[TrackedCode]>>,
    generation: AtomicU64,
    listeners: Mutex<Vec<Arc<ViewChangedCallback>>>,
}

impl Default for ViewInner {
    fn default() -> Self {
        Self {
            snapshot: RwLock::new(Arc::from(Vec::new())),
            generation: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

/// Read-only, order-stable projection of the tracked codes.
///
/// Cheap to clone; all clones observe the same state. For several reads that
/// must agree with each other, take a [`VisibleCodesView::snapshot`] once
/// instead of calling `count` and `get` separately.
#[derive(Clone, Default)]
pub struct VisibleCodesView {
    inner: Arc<ViewInner>,
}

impl VisibleCodesView {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of visible codes.
    pub fn count(&self) -> usize {
        self.inner.snapshot.read().len()
    }

    /// Whether no codes are visible.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Code at `index`, in first-sighting order.
    pub fn get(&self, index: usize) -> Option<TrackedCode> {
        self.inner.snapshot.read().get(index).cloned()
    }

    /// Code with the given payload.
    pub fn find(&self, payload: &[u8]) -> Option<TrackedCode> {
        self.inner
            .snapshot
            .read()
            .iter()
            .find(|code| code.payload == payload)
            .cloned()
    }

    /// The complete set as of the last reconciliation.
    pub fn snapshot(&self) -> Arc<[TrackedCode]> {
        Arc::clone(&self.inner.snapshot.read())
    }

    /// Number of publishes that changed the set.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Register a change listener.
    ///
    /// Listeners run on the thread that publishes (the pipeline's dispatcher)
    /// and must not block for long.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&[TrackedCode]) + Send + Sync + 'static,
    {
        let listener: ViewChangedCallback = Box::new(listener);
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    /// Replace the whole set.
    ///
    /// Returns true and notifies listeners once if the new set differs from
    /// the previous one.
    pub(crate) fn publish(&self, codes: Vec<TrackedCode>) -> bool {
        let snapshot: Arc<[TrackedCode]> = codes.into();
        {
            let mut current = self.inner.snapshot.write();
            if **current == *snapshot {
                return false;
            }
            *current = Arc::clone(&snapshot);
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }

        let listeners: Vec<_> = self.inner.listeners.lock().iter().cloned().collect();
        for listener in listeners {
            call_listener("View", || (**listener)(&snapshot[..]));
        }
        true
    }
}

/// Run a UI callback, logging and swallowing a panic so the calling thread
/// keeps going.
pub(crate) fn call_listener(component: &str, callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!(
            "[{}] Listener panicked: {}",
            component,
            panic_message(payload.as_ref())
        );
    }
}

impl std::fmt::Debug for VisibleCodesView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibleCodesView")
            .field("count", &self.count())
            .field("generation", &self.generation())
            .finish()
    }
}
