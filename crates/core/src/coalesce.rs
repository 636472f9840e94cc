//! Sharing one in-flight remote call between concurrent identical requests.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex},
};

use {
    pushsub_common::{PushError, Result},
    tokio::sync::oneshot,
};

type Waiters<T> = Vec<oneshot::Sender<Result<T>>>;

/// Keyed registry of in-flight calls.
///
/// The first caller for a key starts the call; every caller, the first
/// included, waits for its single result. A key is released before its
/// waiters are resolved, so a call that starts after resolution issues a
/// fresh request.
pub struct Coalescer<K, T> {
    pending: Mutex<HashMap<K, Waiters<T>>>,
}

impl<K, T> Default for Coalescer<K, T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

/// A caller's place in a shared call.
pub struct Ticket<K: Eq + Hash, T: Clone> {
    /// Present for the caller that must start the call.
    pub leader: Option<LeaderGuard<K, T>>,
    pub result: oneshot::Receiver<Result<T>>,
}

impl<K, T> Coalescer<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Enlist for `key`. Only the first caller gets the leader guard.
    pub fn join(self: &Arc<Self>, key: K) -> Ticket<K, T> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        if let Some(waiters) = pending.get_mut(&key) {
            waiters.push(tx);
            return Ticket {
                leader: None,
                result: rx,
            };
        }
        pending.insert(key.clone(), vec![tx]);
        Ticket {
            leader: Some(LeaderGuard {
                coalescer: Arc::clone(self),
                key: Some(key),
            }),
            result: rx,
        }
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

impl<K, T> Coalescer<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    /// Run `call` once for all concurrent callers of `key`.
    ///
    /// The call is driven on its own task when a runtime is available, so it
    /// completes and resolves every caller even if the caller that started
    /// it is dropped.
    pub async fn run<F, Fut>(self: &Arc<Self>, key: K, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let Ticket { leader, result } = self.join(key);
        if let Some(guard) = leader {
            let call = call();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { guard.resolve(call.await) });
                },
                Err(_) => guard.resolve(call.await),
            }
        }
        result.await.unwrap_or_else(|_| Err(abandoned()))
    }
}

impl<K: Eq + Hash, T> Coalescer<K, T> {
    fn take_waiters(&self, key: &K) -> Waiters<T> {
        self.lock().remove(key).unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Waiters<T>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held by whoever drives the call. Resolving it fans the result out;
/// dropping it unresolved (a panicked or cancelled task) fails the waiters
/// with a transport error.
pub struct LeaderGuard<K: Eq + Hash, T: Clone> {
    coalescer: Arc<Coalescer<K, T>>,
    key: Option<K>,
}

impl<K: Eq + Hash, T: Clone> LeaderGuard<K, T> {
    pub fn resolve(mut self, result: Result<T>) {
        if let Some(key) = self.key.take() {
            for waiter in self.coalescer.take_waiters(&key) {
                let _ = waiter.send(result.clone());
            }
        }
    }
}

impl<K: Eq + Hash, T: Clone> Drop for LeaderGuard<K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            for waiter in self.coalescer.take_waiters(&key) {
                let _ = waiter.send(Err(abandoned()));
            }
        }
    }
}

fn abandoned() -> PushError {
    PushError::transport("call abandoned before completion")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
        tokio::sync::Notify,
    };

    #[tokio::test]
    async fn concurrent_callers_share_one_call() {
        let coalescer: Arc<Coalescer<&str, u32>> = Arc::new(Coalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let (c, g) = (Arc::clone(&calls), Arc::clone(&gate));
        let leader = coalescer.run("news", move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            g.notified().await;
            Ok::<_, PushError>(7)
        });
        let c = Arc::clone(&calls);
        let follower = coalescer.run("news", move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, PushError>(0)
        });
        let release = async {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            gate.notify_one();
        };

        let (a, b, ()) = tokio::join!(leader, follower, release);
        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropped_starter_does_not_cancel_the_call() {
        let coalescer: Arc<Coalescer<u8, u32>> = Arc::new(Coalescer::new());
        let gate = Arc::new(Notify::new());

        let g = Arc::clone(&gate);
        let starter = coalescer.run(1, move || async move {
            g.notified().await;
            Ok::<_, PushError>(42)
        });
        // Starting the call happens on first poll; give up right after.
        assert!(
            tokio::time::timeout(Duration::from_millis(10), starter)
                .await
                .is_err()
        );
        assert_eq!(coalescer.in_flight(), 1);

        let follower = coalescer.run(1, || async { Ok::<_, PushError>(0) });
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_one();
        };
        let (result, ()) = tokio::join!(follower, release);
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn errors_fan_out_to_waiters() {
        let coalescer: Arc<Coalescer<u8, ()>> = Arc::new(Coalescer::new());
        let first = coalescer.join(1);
        let second = coalescer.join(1);
        assert!(second.leader.is_none());

        first
            .leader
            .unwrap()
            .resolve(Err(PushError::rejected("invalid_channel", "too long")));
        for rx in [first.result, second.result] {
            assert_eq!(
                rx.await.unwrap().unwrap_err(),
                PushError::rejected("invalid_channel", "too long")
            );
        }
    }

    #[tokio::test]
    async fn dropped_leader_fails_waiters() {
        let coalescer: Arc<Coalescer<u8, bool>> = Arc::new(Coalescer::new());
        let first = coalescer.join(1);
        let second = coalescer.join(1);
        drop(first.leader);
        let err = second.result.await.unwrap().unwrap_err();
        assert!(err.is_ambiguous());
        assert!(coalescer.join(1).leader.is_some());
    }

    #[test]
    fn distinct_keys_do_not_coalesce() {
        let coalescer: Arc<Coalescer<u8, bool>> = Arc::new(Coalescer::new());
        let _first = coalescer.join(1);
        let second = coalescer.join(2);
        assert!(second.leader.is_some());
        assert_eq!(coalescer.in_flight(), 2);
    }
}
