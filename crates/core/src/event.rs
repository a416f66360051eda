use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Handlers<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Handler<E>)>>,
}

/// Synchronous publish/subscribe bus.
///
/// `publish` dispatches over a snapshot of the handler list, so subscribing or
/// unsubscribing from inside a handler only affects later publishes. A handler
/// that panics is logged and skipped; the remaining handlers still run.
pub struct EventBus<E> {
    inner: Arc<Handlers<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Handlers {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.entries.lock() {
            Ok(mut entries) => entries.push((id, Arc::new(handler))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(handler))),
        }
        let weak: Weak<Handlers<E>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut entries = match inner.entries.lock() {
                        Ok(entries) => entries,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    pub fn publish(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = match self.inner.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, h)| h.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, h)| h.clone()).collect(),
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!("Event handler panicked, continuing with remaining handlers");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle keeps the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus: EventBus<u32> = EventBus::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            bus.subscribe(move |n: &u32| {
                total.fetch_add(*n as usize, Ordering::SeqCst);
            });
        }

        bus.publish(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&1);
        sub.unsubscribe();
        bus.publish(&1);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus: EventBus<u32> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("handler failure"));
        let h = hits.clone();
        bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&7);
        bus.publish(&7);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_keeps_current_pass() {
        let bus: Arc<EventBus<u32>> = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let pending: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        // First handler removes the second one while the bus is dispatching.
        let p = pending.clone();
        bus.subscribe(move |_| {
            if let Some(sub) = p.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        let h = hits.clone();
        let second = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        *pending.lock().unwrap() = Some(second);

        bus.publish(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bus.publish(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
