mod common;

use chrono::Duration as ChronoDuration;
use common::{active_card_count, entry_count, open_entry_count, Harness, WAIT};
use progressor_core::{CardStatus, CardUpdate, DomainEvent, ServiceError, INBOX_PROJECT_ID};
use std::sync::Arc;
use std::thread;

const INBOX: i64 = INBOX_PROJECT_ID;

#[test]
fn add_card_creates_inactive_todo_card() {
    let h = Harness::new();
    let id = h.add_card("write report");

    let card = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert_eq!(card.title, "write report");
    assert_eq!(card.status, CardStatus::Todo);
    assert!(!card.is_active);
    assert_eq!(card.tracked_mins, 0);
    assert_eq!(card.estimated_mins, 30);
    assert_eq!(card.completed_at, None);
}

#[test]
fn add_card_with_empty_title_fails_and_persists_nothing() {
    let h = Harness::new();
    let err = h.cards.add_card(INBOX, "", 10).unwrap_err();
    assert!(matches!(err, ServiceError::TitleRequired));

    let err = h.cards.add_card(INBOX, "   ", 10).unwrap_err();
    assert!(matches!(err, ServiceError::TitleRequired));

    assert!(h.cards.get_all(INBOX, CardStatus::Todo).unwrap().is_empty());
}

#[test]
fn title_is_checked_before_project() {
    let h = Harness::new();
    let err = h.cards.add_card(404, "", 10).unwrap_err();
    assert!(matches!(err, ServiceError::TitleRequired));
}

#[test]
fn unknown_project_is_rejected_for_every_operation() {
    let h = Harness::new();
    let id = h.add_card("scoped");

    assert!(matches!(
        h.cards.add_card(404, "orphan", 0),
        Err(ServiceError::InvalidProject(404))
    ));
    assert!(matches!(
        h.cards.start_card(404, id),
        Err(ServiceError::InvalidProject(404))
    ));
    assert!(matches!(
        h.cards.get_all(404, CardStatus::Todo),
        Err(ServiceError::InvalidProject(404))
    ));
    assert!(matches!(
        h.cards.delete_card(404, id),
        Err(ServiceError::InvalidProject(404))
    ));
}

#[test]
fn missing_card_is_not_found() {
    let h = Harness::new();
    assert!(matches!(
        h.cards.get_card_by_id(INBOX, 99),
        Err(ServiceError::NotFound { entity: "card", id: 99 })
    ));
    assert!(matches!(
        h.cards.start_card(INBOX, 99),
        Err(ServiceError::NotFound { .. })
    ));
    assert!(matches!(
        h.cards.delete_card(INBOX, 99),
        Err(ServiceError::NotFound { .. })
    ));
}

#[test]
fn start_then_stop_credits_truncated_minutes() {
    let h = Harness::new();
    let id = h.add_card("focus");

    h.cards.start_card(INBOX, id).unwrap();
    h.clock.advance(ChronoDuration::seconds(25 * 60 + 59));
    h.cards.stop_card(INBOX, id).unwrap();

    let card = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert!(!card.is_active);
    assert_eq!(card.tracked_mins, 25);

    let entries = h.cards.list_time_entries(INBOX, id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].duration_mins, 25);
    assert!(entries[0].end_time > entries[0].start_time);
    assert!(!entries[0].is_open());
}

#[test]
fn repeated_sessions_accumulate() {
    let h = Harness::new();
    let id = h.add_card("long haul");

    for minutes in [10, 20, 7] {
        h.cards.start_card(INBOX, id).unwrap();
        h.advance_minutes(minutes);
        h.cards.stop_card(INBOX, id).unwrap();
        h.advance_minutes(1);
    }

    assert_eq!(h.cards.get_card_by_id(INBOX, id).unwrap().tracked_mins, 37);
    assert_eq!(entry_count(&h.store, id), 3);
}

#[test]
fn active_card_has_exactly_one_open_entry() {
    let h = Harness::new();
    let id = h.add_card("tracked");

    h.cards.start_card(INBOX, id).unwrap();
    assert_eq!(active_card_count(&h.store), 1);
    assert_eq!(open_entry_count(&h.store, id), 1);

    let entry = h.cards.get_active_time_entry(INBOX, id).unwrap();
    assert!(entry.is_open());
    assert_eq!(entry.start_time, common::t0());
    assert_eq!(h.cards.get_active_card().unwrap().map(|card| card.id), Some(id));

    h.advance_minutes(3);
    h.cards.stop_card(INBOX, id).unwrap();
    assert_eq!(active_card_count(&h.store), 0);
    assert_eq!(open_entry_count(&h.store, id), 0);
    assert!(h.cards.get_active_card().unwrap().is_none());
}

#[test]
fn inactive_card_has_no_active_time_entry() {
    let h = Harness::new();
    let id = h.add_card("idle");
    assert!(matches!(
        h.cards.get_active_time_entry(INBOX, id),
        Err(ServiceError::NotFound { .. })
    ));
}

#[test]
fn starting_an_active_card_is_already_active() {
    let h = Harness::new();
    let id = h.add_card("once");
    h.cards.start_card(INBOX, id).unwrap();

    assert!(matches!(
        h.cards.start_card(INBOX, id),
        Err(ServiceError::AlreadyActive(card)) if card == id
    ));
    assert_eq!(open_entry_count(&h.store, id), 1);
}

#[test]
fn stopping_an_inactive_card_is_already_stopped_and_mutates_nothing() {
    let h = Harness::new();
    let id = h.add_card("done before");
    h.cards.start_card(INBOX, id).unwrap();
    h.advance_minutes(4);
    h.cards.stop_card(INBOX, id).unwrap();
    let before = h.cards.list_time_entries(INBOX, id).unwrap();

    h.advance_minutes(10);
    assert!(matches!(
        h.cards.stop_card(INBOX, id),
        Err(ServiceError::AlreadyStopped(card)) if card == id
    ));

    assert_eq!(h.cards.list_time_entries(INBOX, id).unwrap(), before);
    assert_eq!(h.cards.get_card_by_id(INBOX, id).unwrap().tracked_mins, 4);
}

#[test]
fn starting_another_card_stops_the_active_one_first() {
    let h = Harness::new();
    let events = h.record_events();
    let b = h.add_card("B");
    let a = h.add_card("A");

    h.cards.start_card(INBOX, b).unwrap();
    h.advance_minutes(12);
    h.cards.start_card(INBOX, a).unwrap();

    let b_card = h.cards.get_card_by_id(INBOX, b).unwrap();
    assert!(!b_card.is_active);
    assert_eq!(b_card.tracked_mins, 12);
    assert!(h.cards.get_card_by_id(INBOX, a).unwrap().is_active);
    assert_eq!(active_card_count(&h.store), 1);

    let received: Vec<DomainEvent> = (0..3).map(|_| events.recv_timeout(WAIT).unwrap()).collect();
    match received.as_slice() {
        [DomainEvent::CardStarted(first), DomainEvent::CardStopped(stopped), DomainEvent::CardStarted(started)] =>
        {
            assert_eq!(first.card_id, b);
            assert_eq!(stopped.card_id, b);
            assert_eq!(stopped.elapsed_minutes, 12);
            assert_eq!(started.card_id, a);
        }
        other => panic!("unexpected event sequence: {other:?}"),
    }
}

#[test]
fn failed_start_publishes_nothing_and_keeps_previous_card_running() {
    let h = Harness::new();
    let b = h.add_card("B");
    h.cards.start_card(INBOX, b).unwrap();
    let events = h.record_events();

    assert!(h.cards.start_card(INBOX, 999).is_err());
    assert!(h.cards.get_card_by_id(INBOX, b).unwrap().is_active);
    assert!(events.recv_timeout(std::time::Duration::from_millis(100)).is_err());
}

#[test]
fn stop_publishes_card_stopped_with_elapsed_minutes() {
    let h = Harness::new();
    let id = h.add_card("observed");
    h.cards.start_card(INBOX, id).unwrap();
    let events = h.record_events();

    h.advance_minutes(9);
    h.cards.stop_card(INBOX, id).unwrap();

    match events.recv_timeout(WAIT).unwrap() {
        DomainEvent::CardStopped(stopped) => {
            assert_eq!(stopped.card_id, id);
            assert_eq!(stopped.project_id, INBOX);
            assert_eq!(stopped.user_id, 1);
            assert_eq!(stopped.elapsed_minutes, 9);
        }
        other => panic!("expected CardStopped, got {other:?}"),
    }
}

#[test]
fn clock_stepping_backwards_credits_zero_minutes() {
    let h = Harness::new();
    let id = h.add_card("skewed");
    h.cards.start_card(INBOX, id).unwrap();

    h.clock.advance(ChronoDuration::minutes(-5));
    h.cards.stop_card(INBOX, id).unwrap();

    let card = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert!(!card.is_active);
    assert_eq!(card.tracked_mins, 0);
}

#[test]
fn concurrent_starts_leave_a_single_active_card() {
    let h = Harness::new();
    let ids: Vec<_> = (0..8).map(|n| h.add_card(&format!("racer {n}"))).collect();
    let cards = Arc::clone(&h.cards);

    let workers: Vec<_> = ids
        .iter()
        .copied()
        .map(|id| {
            let cards = Arc::clone(&cards);
            thread::spawn(move || {
                for _ in 0..5 {
                    let _ = cards.start_card(INBOX, id);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(active_card_count(&h.store), 1);
    let active = h.cards.get_active_card().unwrap().unwrap();
    assert!(h.cards.get_active_time_entry(INBOX, active.id).unwrap().is_open());
    for id in ids.into_iter().filter(|id| *id != active.id) {
        assert!(matches!(
            h.cards.get_active_time_entry(INBOX, id),
            Err(ServiceError::NotFound { .. })
        ));
    }
}

#[test]
fn store_rejects_a_second_active_card() {
    let h = Harness::new();
    let a = h.add_card("A");
    let b = h.add_card("B");
    h.cards.start_card(INBOX, a).unwrap();

    let result = h.store.read(|conn| {
        conn.execute("UPDATE cards SET is_active = 1 WHERE id = ?1;", [b])
    });
    assert!(result.is_err());
    assert_eq!(active_card_count(&h.store), 1);
}

#[test]
fn update_card_rewrites_only_editable_fields() {
    let h = Harness::new();
    let id = h.add_card("draft");
    h.cards.start_card(INBOX, id).unwrap();
    h.advance_minutes(6);
    h.cards.stop_card(INBOX, id).unwrap();
    h.cards.start_card(INBOX, id).unwrap();

    h.cards
        .update_card(
            INBOX,
            id,
            &CardUpdate {
                title: "final".to_string(),
                description: Some("with notes".to_string()),
                estimated_mins: 90,
            },
        )
        .unwrap();

    let card = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert_eq!(card.title, "final");
    assert_eq!(card.description.as_deref(), Some("with notes"));
    assert_eq!(card.estimated_mins, 90);
    assert_eq!(card.tracked_mins, 6);
    assert!(card.is_active);
    assert_eq!(card.status, CardStatus::Todo);
}

#[test]
fn update_card_with_empty_title_is_invalid_update() {
    let h = Harness::new();
    let id = h.add_card("keep me");
    let err = h
        .cards
        .update_card(INBOX, id, &CardUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidUpdate(_)));
    assert_eq!(h.cards.get_card_by_id(INBOX, id).unwrap().title, "keep me");
}

#[test]
fn status_transitions_manage_completion_time() {
    let h = Harness::new();
    let id = h.add_card("ship it");

    h.cards.update_card_status(INBOX, id, CardStatus::Done).unwrap();
    let done = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert_eq!(done.status, CardStatus::Done);
    assert_eq!(done.completed_at, Some(common::t0()));
    assert_eq!(h.cards.get_all(INBOX, CardStatus::Done).unwrap().len(), 1);

    h.cards.update_card_status(INBOX, id, CardStatus::Todo).unwrap();
    let reopened = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert_eq!(reopened.status, CardStatus::Todo);
    assert_eq!(reopened.completed_at, None);
}

#[test]
fn active_status_value_is_never_assignable() {
    let h = Harness::new();
    let id = h.add_card("vestigial");
    assert!(matches!(
        h.cards.update_card_status(INBOX, id, CardStatus::Active),
        Err(ServiceError::InvalidStatus(CardStatus::Active))
    ));
    assert_eq!(h.cards.get_card_by_id(INBOX, id).unwrap().status, CardStatus::Todo);
}

#[test]
fn delete_card_removes_card_and_entries() {
    let h = Harness::new();
    let id = h.add_card("temporary");
    h.cards.start_card(INBOX, id).unwrap();
    h.advance_minutes(2);
    h.cards.stop_card(INBOX, id).unwrap();

    h.cards.delete_card(INBOX, id).unwrap();
    assert!(matches!(
        h.cards.get_card_by_id(INBOX, id),
        Err(ServiceError::NotFound { .. })
    ));
    assert_eq!(entry_count(&h.store, id), 0);
}

#[test]
fn cleanup_stops_a_dangling_card() {
    let h = Harness::new();
    let id = h.add_card("left running");
    h.cards.start_card(INBOX, id).unwrap();
    h.advance_minutes(41);

    assert_eq!(h.cards.cleanup().unwrap(), Some(id));
    let card = h.cards.get_card_by_id(INBOX, id).unwrap();
    assert!(!card.is_active);
    assert_eq!(card.tracked_mins, 41);

    assert_eq!(h.cards.cleanup().unwrap(), None);
}
