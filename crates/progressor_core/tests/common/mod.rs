#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use progressor_core::service::project_service::ProjectService;
use progressor_core::{
    CardId, CardService, DomainEvent, EventBus, ManualClock, Store, Topic, INBOX_PROJECT_ID,
};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

pub const WAIT: Duration = Duration::from_secs(2);

/// Monday 2024-05-06 09:00:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

/// A runtime whose blocking pool has a single thread, so bus deliveries run
/// in publish order.
pub fn serial_runtime() -> Runtime {
    Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

pub struct Harness {
    pub runtime: Runtime,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub clock: Arc<ManualClock>,
    pub projects: Arc<ProjectService>,
    pub cards: Arc<CardService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(Store::open_in_memory().unwrap()))
    }

    pub fn with_store(store: Arc<Store>) -> Self {
        let runtime = serial_runtime();
        let bus = Arc::new(EventBus::new(runtime.handle().clone()));
        let clock = Arc::new(ManualClock::new(t0()));
        let projects = Arc::new(ProjectService::with_clock(store.clone(), clock.clone()));
        let cards = Arc::new(
            CardService::new(store.clone(), projects.clone(), bus.clone()).with_clock(clock.clone()),
        );
        Self {
            runtime,
            store,
            bus,
            clock,
            projects,
            cards,
        }
    }

    /// Forwards every published event to the returned channel.
    pub fn record_events(&self) -> Receiver<DomainEvent> {
        let (tx, rx) = mpsc::channel();
        for topic in [Topic::CardStopped, Topic::CardStarted] {
            let tx = tx.clone();
            self.bus.subscribe(topic, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    pub fn add_card(&self, title: &str) -> CardId {
        self.cards.add_card(INBOX_PROJECT_ID, title, 30).unwrap()
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }
}

pub fn active_card_count(store: &Store) -> i64 {
    store
        .read(|conn| conn.query_row("SELECT COUNT(*) FROM cards WHERE is_active = 1;", [], |row| row.get(0)))
        .unwrap()
}

/// Entries whose end equals their start.
pub fn open_entry_count(store: &Store, card_id: CardId) -> i64 {
    store
        .read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM time_entries WHERE card_id = ?1 AND end_time = start_time;",
                [card_id],
                |row| row.get(0),
            )
        })
        .unwrap()
}

pub fn entry_count(store: &Store, card_id: CardId) -> i64 {
    store
        .read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM time_entries WHERE card_id = ?1;",
                [card_id],
                |row| row.get(0),
            )
        })
        .unwrap()
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
