//! Change-notification bus.
//!
//! Observers are plain callbacks grouped under an [`ObserverContext`] so a
//! screen or component can drop all of its registrations at once. Each
//! notification is also published on a `tokio::sync::broadcast` channel for
//! hosts that would rather consume a stream.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    tokio::sync::broadcast,
    tracing::{debug, warn},
    uuid::Uuid,
};

const BROADCAST_CAPACITY: usize = 64;

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle grouping observer registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverContext(Uuid);

impl ObserverContext {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Published once per notification. `sequence` increases by one each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionsChanged {
    pub sequence: u64,
}

pub struct ChangeBus {
    observers: Mutex<Vec<(ObserverContext, Observer)>>,
    tx: broadcast::Sender<SubscriptionsChanged>,
    sequence: AtomicU64,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            observers: Mutex::new(Vec::new()),
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Register `callback` under `context`. Registering the same callback
    /// twice makes it fire twice.
    pub fn add<F>(&self, context: ObserverContext, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock().push((context, Arc::new(callback)));
    }

    /// Remove every callback registered under `context`. Notifications that
    /// start after this returns will not reach them.
    pub fn remove_all(&self, context: ObserverContext) -> usize {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|(owner, _)| *owner != context);
        before - observers.len()
    }

    /// Swap every callback under `context` for `callback` in one step, so a
    /// concurrent notification sees either the old set or the new one.
    /// Returns how many callbacks were replaced.
    pub fn replace<F>(&self, context: ObserverContext, callback: F) -> usize
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|(owner, _)| *owner != context);
        let replaced = before - observers.len();
        observers.push((context, Arc::new(callback)));
        replaced
    }

    /// Invoke every observer in registration order, then publish on the
    /// broadcast channel. Returns the number of callbacks invoked.
    pub fn notify_all(&self) -> usize {
        let snapshot: Vec<(ObserverContext, Observer)> = self.lock().clone();

        for (context, observer) in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| observer())).is_err() {
                warn!(context = %context, "change observer panicked");
            }
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        // `send` fails only when nobody is subscribed.
        let receivers = self.tx.send(SubscriptionsChanged { sequence }).unwrap_or(0);
        debug!(
            observers = snapshot.len(),
            receivers, sequence, "subscriptions potentially changed"
        );
        snapshot.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubscriptionsChanged> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ObserverContext, Observer)>> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
