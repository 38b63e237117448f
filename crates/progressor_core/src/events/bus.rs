//! Topic-keyed, fire-and-forget publish/subscribe.
//!
//! # Invariants
//! - `publish` never waits for a handler to start or finish.
//! - Every handler runs as its own task on the runtime's blocking pool.
//! - A handler panic is caught and logged inside its task; the publisher
//!   never observes it.
//! - Delivery is at-most-once and in-memory only.
//! - [`EventBus::flush`] is the only way to wait for deliveries; short-lived
//!   hosts call it before dropping their runtime.

use super::{DomainEvent, Topic};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Callback invoked once per published event on a subscribed topic.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Process-wide subscriber registry.
pub struct EventBus {
    runtime: Handle,
    subscribers: RwLock<HashMap<Topic, Vec<EventHandler>>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    /// Creates a bus that schedules deliveries on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            subscribers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Appends `handler` to the topic's handler list.
    pub fn subscribe<F>(&self, topic: Topic, handler: F)
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers
            .entry(topic)
            .or_default()
            .push(Arc::new(handler));
        debug!("event=bus_subscribe module=events status=ok topic={topic}");
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Schedules every handler of `topic` with its own copy of `event`.
    ///
    /// Returns the number of deliveries scheduled.
    pub fn publish(&self, topic: Topic, event: DomainEvent) -> usize {
        let handlers = {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(&topic) {
                Some(handlers) => handlers.clone(),
                None => Vec::new(),
            }
        };

        let mut in_flight = self.lock_in_flight();
        in_flight.retain(|task| !task.is_finished());
        for handler in &handlers {
            let handler = Arc::clone(handler);
            let event = event.clone();
            in_flight.push(
                self.runtime
                    .spawn_blocking(move || deliver(topic, &handler, &event)),
            );
        }
        drop(in_flight);

        debug!(
            "event=bus_publish module=events status=ok topic={topic} card_id={} handlers={}",
            event.card_id(),
            handlers.len()
        );
        handlers.len()
    }

    /// Publishes `event` on the topic matching its variant.
    pub fn emit(&self, event: DomainEvent) -> usize {
        self.publish(event.topic(), event)
    }

    /// Waits until every delivery scheduled so far has finished, including
    /// deliveries scheduled by handlers in the meantime.
    pub async fn flush(&self) {
        loop {
            let pending = std::mem::take(&mut *self.lock_in_flight());
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(err) = task.await {
                    warn!("event=bus_flush module=events status=error error={err}");
                }
            }
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(topic: Topic, handler: &EventHandler, event: &DomainEvent) {
    if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        error!(
            "event=bus_deliver module=events status=error topic={topic} card_id={} error_code=handler_panicked",
            event.card_id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use crate::events::{CardStarted, DomainEvent, Topic};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn started(card_id: i64) -> DomainEvent {
        DomainEvent::CardStarted(CardStarted {
            card_id,
            project_id: 1,
            user_id: 1,
            started_at: Utc::now(),
        })
    }

    #[test]
    fn publish_without_subscribers_schedules_nothing() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = EventBus::new(runtime.handle().clone());
        assert_eq!(bus.publish(Topic::CardStarted, started(1)), 0);
    }

    #[test]
    fn every_handler_receives_its_topic_only() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = EventBus::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();

        for name in ["first", "second"] {
            let tx = tx.clone();
            bus.subscribe(Topic::CardStarted, move |event| {
                tx.send((name, event.card_id())).unwrap();
            });
        }
        let stopped_tx = tx.clone();
        bus.subscribe(Topic::CardStopped, move |_| {
            stopped_tx.send(("stopped", 0)).unwrap();
        });

        assert_eq!(bus.handler_count(Topic::CardStarted), 2);
        assert_eq!(bus.publish(Topic::CardStarted, started(7)), 2);

        let mut received = vec![
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        ];
        received.sort();
        assert_eq!(received, vec![("first", 7), ("second", 7)]);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn panicking_handler_does_not_affect_publisher_or_siblings() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = EventBus::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();

        bus.subscribe(Topic::CardStarted, |_| panic!("handler failure"));
        bus.subscribe(Topic::CardStarted, move |event| {
            tx.send(event.card_id()).unwrap();
        });

        assert_eq!(bus.emit(started(3)), 2);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 3);
    }

    #[test]
    fn publish_returns_before_slow_handler_finishes() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = EventBus::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel::<()>();

        bus.subscribe(Topic::CardStarted, move |_| {
            std::thread::sleep(Duration::from_millis(300));
            tx.send(()).unwrap();
        });

        bus.publish(Topic::CardStarted, started(1));
        assert!(rx.try_recv().is_err());
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn flush_waits_for_pending_deliveries() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bus = EventBus::new(runtime.handle().clone());
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&delivered);
        bus.subscribe(Topic::CardStarted, move |_| {
            std::thread::sleep(Duration::from_millis(200));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(Topic::CardStarted, |_| panic!("handler failure"));

        bus.publish(Topic::CardStarted, started(1));
        bus.publish(Topic::CardStarted, started(2));
        runtime.block_on(bus.flush());

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        runtime.block_on(bus.flush());
    }
}
