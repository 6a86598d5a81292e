//! Publish-subscribe broadcast hub.
//!
//! A [`Hub`] fans every published value out to all currently registered
//! subscribers. Each [`Registration`] owns an independent bounded queue, so
//! a slow or stalled subscriber never delays delivery to the others and
//! never blocks the publisher.
//!
//! # Concurrency
//!
//! The active subscriber set lives behind a single mutex. `subscribe`,
//! `unsubscribe` and the start of `publish` take that lock briefly;
//! `publish` copies the current senders out and releases the lock before
//! fanning out, so delivery never holds the registry.
//!
//! # Lifecycle
//!
//! A registration receives only values published after it was created.
//! It is removed from the hub when passed to [`Hub::unsubscribe`] or when
//! it is dropped, whichever comes first, so no exit path can leak it.
//!
//! # Backpressure
//!
//! Each queue holds at most `capacity` undelivered values. When a queue is
//! full the value is dropped for that subscriber only and its
//! [`Registration::lagged`] counter is incremented.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Sending half of one subscriber's queue plus its drop counter.
struct Subscriber<T> {
    tx: mpsc::Sender<T>,
    lagged: Arc<AtomicU64>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            lagged: Arc::clone(&self.lagged),
        }
    }
}

impl<T> Subscriber<T> {
    /// Queue `value` without waiting. Returns whether it was accepted.
    fn offer(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.lagged.fetch_add(1, Ordering::Relaxed);
                false
            }
            // Receiver dropped after the registry was copied; its own drop
            // removes the entry.
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// The active subscriber set.
struct Registry<T> {
    next_id: u64,
    subscribers: BTreeMap<u64, Subscriber<T>>,
}

struct HubInner<T> {
    name: &'static str,
    capacity: usize,
    registry: Mutex<Registry<T>>,
}

impl<T> HubInner<T> {
    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        // The registry holds no invariants a panicking holder could break
        // half-way, so a poisoned lock is still usable.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) -> bool {
        let removed = self.registry().subscribers.remove(&id).is_some();
        if removed {
            tracing::trace!(hub = self.name, id, "Subscriber removed");
        }
        removed
    }
}

/// A broadcast hub for values of type `T`.
///
/// Cloning a hub yields another handle to the same subscriber set.
pub struct Hub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> core::fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hub")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> Hub<T> {
    /// Number of registrations currently active.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry().subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    /// Create an empty hub.
    ///
    /// `name` only appears in log lines. A `capacity` of zero is treated
    /// as one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                name,
                capacity: capacity.max(1),
                registry: Mutex::new(Registry {
                    next_id: 0,
                    subscribers: BTreeMap::new(),
                }),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// The registration sees every value published after this call returns
    /// and none published before it.
    pub fn subscribe(&self) -> Registration<T> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let lagged = Arc::new(AtomicU64::new(0));

        let id = {
            let mut registry = self.inner.registry();
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            registry.subscribers.insert(
                id,
                Subscriber {
                    tx,
                    lagged: Arc::clone(&lagged),
                },
            );
            id
        };

        tracing::trace!(hub = self.inner.name, id, "Subscriber added");

        Registration {
            id,
            rx,
            lagged,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `value` to every currently registered subscriber.
    ///
    /// Never blocks. Returns the number of subscribers whose queue accepted
    /// the value; subscribers with a full queue miss it and have their
    /// lag counter bumped.
    pub fn publish(&self, value: T) -> usize {
        let subscribers: Vec<Subscriber<T>> =
            self.inner.registry().subscribers.values().cloned().collect();

        let Some((last, rest)) = subscribers.split_last() else {
            return 0;
        };

        let delivered = rest
            .iter()
            .filter(|subscriber| subscriber.offer(value.clone()))
            .count();
        if last.offer(value) {
            delivered.saturating_add(1)
        } else {
            delivered
        }
    }

    /// Remove `registration` from the hub and release its queue.
    ///
    /// Safe to call while a publish is in flight; that publish may or may
    /// not have queued its value for this registration, which is then
    /// discarded.
    pub fn unsubscribe(&self, registration: Registration<T>) {
        self.inner.remove(registration.id);
        drop(registration);
    }
}

/// One subscriber's live handle on a [`Hub`].
///
/// Dropping the registration unsubscribes it.
pub struct Registration<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
    lagged: Arc<AtomicU64>,
    hub: Weak<HubInner<T>>,
}

impl<T> Registration<T> {
    /// Wait for the next published value.
    ///
    /// Values arrive in publish order. Returns `None` once the hub has been
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take an already-queued value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of values dropped for this registration because its queue
    /// was full.
    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }
}

impl<T> core::fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("lagged", &self.lagged())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn every_subscriber_gets_every_value_in_order() {
        let hub: Hub<u32> = Hub::new("test", 16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        for n in 0..10 {
            assert_eq!(hub.publish(n), 2);
        }

        for n in 0..10 {
            assert_eq!(a.recv().await, Some(n));
            assert_eq!(b.recv().await, Some(n));
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_later_values() {
        let hub: Hub<u32> = Hub::new("test", 16);
        let mut early = hub.subscribe();

        hub.publish(1);
        hub.publish(2);
        let mut late = hub.subscribe();
        hub.publish(3);

        assert_eq!(early.recv().await, Some(1));
        assert_eq!(early.recv().await, Some(2));
        assert_eq!(early.recv().await, Some(3));
        assert_eq!(late.recv().await, Some(3));
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub: Hub<&str> = Hub::new("test", 4);
        assert_eq!(hub.publish("alive"), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_and_drop_both_release() {
        let hub: Hub<u8> = Hub::new("test", 4);
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.unsubscribe(a);
        assert_eq!(hub.subscriber_count(), 1);

        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(1), 0);
    }

    #[test]
    fn full_queue_drops_for_that_subscriber_only() {
        let hub: Hub<u32> = Hub::new("test", 2);
        let mut stalled = hub.subscribe();
        let mut draining = hub.subscribe();

        for n in 0..4 {
            let expected = if n < 2 { 2 } else { 1 };
            assert_eq!(hub.publish(n), expected);
            assert_eq!(draining.try_recv(), Some(n));
        }

        assert_eq!(stalled.lagged(), 2);
        assert_eq!(draining.lagged(), 0);
        assert_eq!(stalled.try_recv(), Some(0));
        assert_eq!(stalled.try_recv(), Some(1));
        assert_eq!(stalled.try_recv(), None);
    }

    #[tokio::test]
    async fn dropping_the_hub_ends_the_stream() {
        let hub: Hub<u8> = Hub::new("test", 4);
        let mut reg = hub.subscribe();
        hub.publish(7);
        drop(hub);

        assert_eq!(reg.recv().await, Some(7));
        assert_eq!(reg.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_leaves_survivors_intact() {
        let hub: Hub<u64> = Hub::new("test", 1024);
        let mut survivor = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for n in 0..500 {
                    hub.publish(n);
                    tokio::task::yield_now().await;
                }
            })
        };

        let churners: Vec<_> = (0..8)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let reg = hub.subscribe();
                        tokio::task::yield_now().await;
                        hub.unsubscribe(reg);
                    }
                })
            })
            .collect();

        publisher.await.unwrap();
        for churner in churners {
            churner.await.unwrap();
        }

        for n in 0..500 {
            let got = tokio::time::timeout(Duration::from_secs(1), survivor.recv())
                .await
                .unwrap();
            assert_eq!(got, Some(n));
        }
        assert_eq!(survivor.lagged(), 0);
        assert_eq!(hub.subscriber_count(), 1);
    }
}
