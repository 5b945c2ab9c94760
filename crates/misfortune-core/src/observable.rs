//! A concurrency-safe observable value container.
//!
//! [`Observable`] holds one current value, replaced wholesale on every
//! update, and a registry of listeners notified after each committed
//! change. It knows nothing about wheels; the session layer builds the
//! spin state machine on top of it.
//!
//! # Contract
//!
//! - [`Observable::read`] never blocks, not even while a writer holds the
//!   exclusivity lock. Values are swapped as whole [`Arc`]s so no partial
//!   write is ever visible.
//! - [`Observable::update`] suppresses the change (and the notification)
//!   when the new value equals the current one.
//! - [`Observable::atomic`] scopes the exclusivity lock over a caller's
//!   read-modify-write sequence. Dropping the guard without updating
//!   commits nothing, so caller errors roll back for free.
//! - Listener fan-out is concurrent: one task per listener under a
//!   [`JoinSet`], so a slow listener never delays delivery to the others.
//!   The policy is fail-fast: the first listener error aborts the rest of
//!   the batch and surfaces to the caller of `update` as [`NotifyError`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use tokio::sync::Mutex as UpdateLock;
use tokio::task::JoinSet;
use tracing::error;

/// A listener callback invoked with each committed value.
pub type Listener<T> =
    Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, Result<(), ListenerError>> + Send + Sync>;

/// Error returned by a listener callback.
#[derive(Debug, Clone, thiserror::Error)]
#[error("listener error: {message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    /// Create a listener error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can abort a notification batch.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A listener callback failed; the whole batch was aborted.
    #[error("notification batch aborted: {0}")]
    Listener(#[from] ListenerError),

    /// A listener task panicked before completing.
    #[error("listener task panicked: {0}")]
    Panicked(#[from] tokio::task::JoinError),
}

/// Handle identifying a registered listener, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A concurrency-safe container broadcasting committed value changes.
///
/// One exclusivity lock per instance serializes `update` and `atomic`
/// sections strictly relative to each other; reads never block. There is
/// no global lock across instances.
pub struct Observable<T> {
    /// Current value; swapped wholesale, read lock-free.
    current: ArcSwap<T>,
    /// Exclusivity lock serializing writers.
    update_lock: UpdateLock<()>,
    /// Registered listeners in insertion order.
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    /// Source of listener handles.
    next_listener: AtomicU64,
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(value),
            update_lock: UpdateLock::new(()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Return the current value without blocking on writers.
    pub fn read(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Replace the current value and notify listeners.
    ///
    /// If `value` equals the current value the call is a no-op and no
    /// listener is notified. Serializes with other `update` and
    /// [`atomic`](Self::atomic) calls on this instance.
    pub async fn update(&self, value: T) -> Result<(), NotifyError> {
        let _guard = self.update_lock.lock().await;
        self.commit(value).await
    }

    /// Acquire the exclusivity lock for a compound read-modify-write
    /// sequence.
    ///
    /// The returned guard holds the lock until dropped; no other writer
    /// can observe or produce an intermediate value inside the window.
    /// This is the only race-free way to implement check-then-act logic
    /// such as "fail if already locked, else lock".
    pub async fn atomic(&self) -> AtomicObservable<'_, T> {
        AtomicObservable {
            observable: self,
            _guard: self.update_lock.lock().await,
        }
    }

    /// Register a listener; returns its handle.
    pub fn add_listener(&self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, listener));
        id
    }

    /// Remove a previously registered listener.
    ///
    /// Returns `false` when the handle is not registered, so cleanup code
    /// may call this unconditionally.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Swap in `value` (unless equal) and fan out notifications.
    ///
    /// Caller must hold the exclusivity lock.
    async fn commit(&self, value: T) -> Result<(), NotifyError> {
        if **self.current.load() == value {
            return Ok(());
        }

        let value = Arc::new(value);
        self.current.store(Arc::clone(&value));
        self.notify(value).await
    }

    /// Invoke every registered listener concurrently with `value`.
    ///
    /// Fail-fast: the first listener failure aborts all outstanding
    /// listener tasks in this batch and is returned to the caller.
    async fn notify(&self, value: Arc<T>) -> Result<(), NotifyError> {
        let listeners: Vec<Listener<T>> = self
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut batch = JoinSet::new();
        for listener in listeners {
            batch.spawn(listener(Arc::clone(&value)));
        }

        while let Some(joined) = batch.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "listener failed, aborting notification batch");
                    batch.abort_all();
                    return Err(NotifyError::Listener(e));
                }
                Err(e) if e.is_panic() => {
                    error!(error = %e, "listener panicked, aborting notification batch");
                    batch.abort_all();
                    return Err(NotifyError::Panicked(e));
                }
                // Cancelled siblings of an already-aborted batch.
                Err(_) => {}
            }
        }

        Ok(())
    }

    /// Lock the listener registry, recovering from poisoning.
    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener<T>)>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Observable")
            .field("current", &self.current.load())
            .finish_non_exhaustive()
    }
}

/// Scoped exclusive access to an [`Observable`].
///
/// Holds the exclusivity lock for its lifetime. At most one
/// [`update`](Self::update) is expected per guard; reads inside the
/// window observe no concurrent writes.
pub struct AtomicObservable<'a, T> {
    observable: &'a Observable<T>,
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

impl<T> AtomicObservable<'_, T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Return the current value.
    pub fn read(&self) -> Arc<T> {
        self.observable.read()
    }

    /// Commit `value` (unless equal to the current one) and notify
    /// listeners, without releasing the exclusivity lock.
    pub async fn update(&self, value: T) -> Result<(), NotifyError> {
        self.observable.commit(value).await
    }

    /// Register a listener while the lock is held.
    ///
    /// Lets a subscriber read the current value and attach its listener
    /// with no update slipping in between, so it neither misses nor
    /// double-receives a change.
    pub fn add_listener(&self, listener: Listener<T>) -> ListenerId {
        self.observable.add_listener(listener)
    }
}
