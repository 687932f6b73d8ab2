//! Subscriber list shared by the capture, waveform, monitor and playback components.
//!
//! Each component owns one emitter and clears it on teardown, so listeners
//! never outlive the component that feeds them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Listener invoked synchronously for every emitted event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;

/// Token returned by [`EventEmitter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registry<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener<E>)>>,
}

/// Cloneable handle to a shared listener registry.
pub struct EventEmitter<E> {
    inner: Arc<Registry<E>>,
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener.
    ///
    /// The registry lock is released before listeners run, so a listener may
    /// subscribe or unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}
