//! Host process lifecycle.
//!
//! The host reports coarse app states through an [`AppStateSource`]. The
//! [`LifecycleMonitor`] keeps exactly one subscription to it and turns state
//! changes into foreground/background edges:
//!
//! - `inactive | background` → `active` fires `on_foreground`
//! - `active` → `inactive | background` fires `on_background`
//! - anything else fires nothing

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Coarse application state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    /// In the foreground and receiving input.
    Active,
    /// Visible but not receiving input (e.g. during a system dialog).
    Inactive,
    /// Not visible.
    Background,
}

impl AppState {
    /// Returns true for the foreground bucket.
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppState::Active)
    }
}

/// Listener invoked with each new app state.
pub type StateListener = Arc<dyn Fn(AppState) + Send + Sync>;

/// Handle to an active subscription.
///
/// Dropping the handle (or calling [`dispose`](Self::dispose)) unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a subscription that runs `disposer` once when released.
    pub fn new(disposer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Unsubscribes now.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

/// Source of host state-change notifications.
pub trait AppStateSource: Send + Sync {
    /// Returns the current state.
    fn current_state(&self) -> AppState;

    /// Registers `listener`; it is called on every reported state.
    fn subscribe(&self, listener: StateListener) -> Subscription;
}

struct SourceInner {
    state: RwLock<AppState>,
    listeners: RwLock<Vec<(u64, StateListener)>>,
    next_id: Mutex<u64>,
}

/// An [`AppStateSource`] driven by explicit calls.
///
/// Used by tests and by hosts that push state changes themselves.
#[derive(Clone)]
pub struct ManualAppStateSource {
    inner: Arc<SourceInner>,
}

impl ManualAppStateSource {
    /// Creates a source starting in `initial`.
    pub fn new(initial: AppState) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                state: RwLock::new(initial),
                listeners: RwLock::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// Reports a new state to every listener.
    pub fn set_state(&self, state: AppState) {
        *self.inner.state.write() = state;
        // Call outside the lock so listeners may unsubscribe.
        let listeners: Vec<StateListener> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl AppStateSource for ManualAppStateSource {
    fn current_state(&self) -> AppState {
        *self.inner.state.read()
    }

    fn subscribe(&self, listener: StateListener) -> Subscription {
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        self.inner.listeners.write().push((id, listener));

        let weak: Weak<SourceInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().retain(|(lid, _)| *lid != id);
            }
        })
    }
}

impl std::fmt::Debug for ManualAppStateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualAppStateSource")
            .field("state", &self.current_state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks fired on lifecycle edges.
#[derive(Clone, Default)]
pub struct LifecycleHandlers {
    on_foreground: Option<Callback>,
    on_background: Option<Callback>,
}

impl LifecycleHandlers {
    /// Creates an empty set of handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback for background → foreground.
    pub fn on_foreground(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_foreground = Some(Arc::new(f));
        self
    }

    /// Sets the callback for foreground → background.
    pub fn on_background(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_background = Some(Arc::new(f));
        self
    }
}

struct MonitorState {
    current: AppState,
    subscription: Option<Subscription>,
}

/// Turns app state changes into foreground/background callbacks.
pub struct LifecycleMonitor {
    source: Arc<dyn AppStateSource>,
    state: Arc<Mutex<MonitorState>>,
}

impl LifecycleMonitor {
    /// Creates a monitor over `source`. Nothing is observed until [`init`](Self::init).
    pub fn new(source: Arc<dyn AppStateSource>) -> Self {
        let current = source.current_state();
        Self {
            source,
            state: Arc::new(Mutex::new(MonitorState {
                current,
                subscription: None,
            })),
        }
    }

    /// Subscribes to the source with `handlers`.
    ///
    /// Calling `init` again replaces the previous subscription, so there is
    /// never more than one.
    pub fn init(&self, handlers: LifecycleHandlers) {
        self.cleanup();

        self.state.lock().current = self.source.current_state();

        let state = Arc::clone(&self.state);
        let listener: StateListener = Arc::new(move |next: AppState| {
            let previous = {
                let mut guard = state.lock();
                std::mem::replace(&mut guard.current, next)
            };

            match (previous.is_foreground(), next.is_foreground()) {
                (false, true) => {
                    debug!(?previous, ?next, "app entered foreground");
                    if let Some(cb) = &handlers.on_foreground {
                        cb();
                    }
                }
                (true, false) => {
                    debug!(?previous, ?next, "app entered background");
                    if let Some(cb) = &handlers.on_background {
                        cb();
                    }
                }
                _ => {}
            }
        });

        let subscription = self.source.subscribe(listener);
        self.state.lock().subscription = Some(subscription);
    }

    /// Unsubscribes. Safe to call repeatedly or before `init`.
    pub fn cleanup(&self) {
        let subscription = self.state.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.dispose();
            debug!("lifecycle monitor unsubscribed");
        }
    }

    /// Last observed state.
    pub fn current_state(&self) -> AppState {
        self.state.lock().current
    }

    /// Returns true while subscribed.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().subscription.is_some()
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for LifecycleMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleMonitor")
            .field("current", &self.current_state())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
