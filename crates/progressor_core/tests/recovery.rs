mod common;

use common::{active_card_count, serial_runtime, t0, wait_until, Harness};
use progressor_core::service::recovery::RecoverySweep;
use progressor_core::service::skill_service::SkillService;
use progressor_core::{
    FocusTimerConfig, IdleNotifier, IdlePrompt, ManualClock, Session, SessionOptions, Store,
    TimerStatus, INBOX_PROJECT_ID,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn startup_sweep_with_nothing_active_is_a_no_op() {
    let h = Harness::new();
    let sweep = RecoverySweep::new(h.cards.clone(), None);
    assert_eq!(sweep.on_startup().unwrap(), None);
    assert_eq!(sweep.on_shutdown().unwrap(), None);
}

#[test]
fn startup_sweep_stops_the_dangling_card() {
    let h = Harness::new();
    let id = h.add_card("crashed mid-session");
    h.cards.start_card(INBOX_PROJECT_ID, id).unwrap();
    h.advance_minutes(17);

    let sweep = RecoverySweep::new(h.cards.clone(), None);
    assert_eq!(sweep.on_startup().unwrap(), Some(id));
    assert_eq!(active_card_count(&h.store), 0);
    assert_eq!(
        h.cards.get_card_by_id(INBOX_PROJECT_ID, id).unwrap().tracked_mins,
        17
    );

    assert_eq!(sweep.on_startup().unwrap(), None);
}

#[test]
fn dangling_card_survives_reopen_and_is_swept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progressor.db");

    let id = {
        let h = Harness::with_store(Arc::new(Store::open(&path).unwrap()));
        let id = h.add_card("left running");
        h.cards.start_card(INBOX_PROJECT_ID, id).unwrap();
        id
    };

    let h = Harness::with_store(Arc::new(Store::open(&path).unwrap()));
    assert_eq!(active_card_count(&h.store), 1);
    h.advance_minutes(8);

    let sweep = RecoverySweep::new(h.cards.clone(), None);
    assert_eq!(sweep.on_startup().unwrap(), Some(id));
    assert_eq!(
        h.cards.get_card_by_id(INBOX_PROJECT_ID, id).unwrap().tracked_mins,
        8
    );
}

struct Unobserved;

impl IdleNotifier for Unobserved {
    fn idle_timeout(&self, _prompt: &IdlePrompt) -> bool {
        false
    }
}

fn session_options(clock: Arc<ManualClock>) -> SessionOptions {
    SessionOptions {
        notifier: Arc::new(Unobserved),
        clock,
        focus: FocusTimerConfig {
            default_timeout_minutes: 30,
            minute_length: Duration::from_millis(50),
        },
        ..SessionOptions::default()
    }
}

#[test]
fn session_open_recovers_and_shutdown_stops_the_active_card() {
    let runtime = serial_runtime();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(t0()));

    let leftover = {
        let h = Harness::with_store(store.clone());
        let id = h.add_card("from last run");
        h.cards.start_card(INBOX_PROJECT_ID, id).unwrap();
        id
    };
    clock.advance(chrono::Duration::minutes(3));

    let session = Session::open(store.clone(), runtime.handle().clone(), session_options(clock.clone()))
        .unwrap();
    assert_eq!(active_card_count(&store), 0);
    assert_eq!(
        session
            .cards
            .get_card_by_id(INBOX_PROJECT_ID, leftover)
            .unwrap()
            .tracked_mins,
        3
    );

    let id = session.cards.add_card(INBOX_PROJECT_ID, "today", 25).unwrap();
    session.cards.start_card(INBOX_PROJECT_ID, id).unwrap();
    assert!(wait_until(|| session.focus_timer.status() == TimerStatus::Armed { card_id: id }));

    clock.advance(chrono::Duration::minutes(20));
    assert_eq!(session.shutdown().unwrap(), Some(id));
    assert_eq!(session.focus_timer.status(), TimerStatus::Idle);
    assert_eq!(active_card_count(&store), 0);
    assert_eq!(
        session.cards.get_card_by_id(INBOX_PROJECT_ID, id).unwrap().tracked_mins,
        20
    );

    assert_eq!(session.shutdown().unwrap(), None);
}

#[test]
fn session_wires_skill_accrual() {
    let runtime = serial_runtime();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(t0()));
    let session = Session::open(store.clone(), runtime.handle().clone(), session_options(clock.clone()))
        .unwrap();

    let skills: &SkillService = &session.skills;
    let skill = skills.create_skill("Deep work", None).unwrap();
    session
        .projects
        .add_project_skill(INBOX_PROJECT_ID, skill.id)
        .unwrap();

    let id = session.cards.add_card(INBOX_PROJECT_ID, "focus block", 50).unwrap();
    session.cards.start_card(INBOX_PROJECT_ID, id).unwrap();
    clock.advance(chrono::Duration::minutes(50));
    session.cards.stop_card(INBOX_PROJECT_ID, id).unwrap();

    assert!(wait_until(|| skills
        .get_user_skill_progress(skill.id)
        .unwrap()
        .is_some_and(|progress| progress.total_minutes_tracked == 50)));
    session.shutdown().unwrap();
}
