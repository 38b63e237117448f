mod common;

use common::{t0, wait_until, Harness};
use progressor_core::service::project_service::SkillCatalog;
use progressor_core::service::skill_service::{SkillProgressAccrual, SkillService};
use progressor_core::{CardStopped, ServiceError, ServiceResult, INBOX_PROJECT_ID};
use progressor_core::model::skill::Skill;
use std::sync::Arc;

fn skill_service(h: &Harness) -> SkillService {
    SkillService::new(h.store.clone()).with_clock(h.clock.clone())
}

#[test]
fn skill_crud_roundtrip() {
    let h = Harness::new();
    let skills = skill_service(&h);

    let rust = skills.create_skill("Rust", Some("systems")).unwrap();
    let sql = skills.create_skill("  SQL  ", None).unwrap();
    assert_eq!(sql.name, "SQL");

    let listed: Vec<_> = skills
        .get_skills_by_user()
        .unwrap()
        .into_iter()
        .map(|skill| skill.name)
        .collect();
    assert_eq!(listed, vec!["Rust".to_string(), "SQL".to_string()]);

    skills.update_skill(rust.id, "Rust 2024", None).unwrap();
    let updated = skills.get_skill_by_id(rust.id).unwrap();
    assert_eq!(updated.name, "Rust 2024");
    assert_eq!(updated.description, None);

    skills.delete_skill(sql.id).unwrap();
    assert!(matches!(
        skills.get_skill_by_id(sql.id),
        Err(ServiceError::NotFound { entity: "skill", .. })
    ));
    assert!(matches!(
        skills.delete_skill(sql.id),
        Err(ServiceError::NotFound { .. })
    ));
}

#[test]
fn blank_skill_name_is_invalid() {
    let h = Harness::new();
    assert!(matches!(
        skill_service(&h).create_skill(" ", None),
        Err(ServiceError::InvalidUpdate(_))
    ));
}

#[test]
fn stopping_a_card_accrues_minutes_to_linked_skills() {
    let h = Harness::new();
    let skills = skill_service(&h);
    let writing = skills.create_skill("Writing", None).unwrap();
    let research = skills.create_skill("Research", None).unwrap();
    let unrelated = skills.create_skill("Cooking", None).unwrap();
    h.projects
        .add_project_skill(INBOX_PROJECT_ID, writing.id)
        .unwrap();
    h.projects
        .add_project_skill(INBOX_PROJECT_ID, research.id)
        .unwrap();

    let accrual = Arc::new(SkillProgressAccrual::new(h.store.clone(), h.projects.clone()));
    accrual.register_event_handlers(&h.bus);

    let id = h.add_card("essay");
    h.cards.start_card(INBOX_PROJECT_ID, id).unwrap();
    h.advance_minutes(25);
    h.cards.stop_card(INBOX_PROJECT_ID, id).unwrap();

    assert!(wait_until(|| skills
        .get_user_skill_progress(research.id)
        .unwrap()
        .is_some()));
    for skill in [&writing, &research] {
        let progress = skills.get_user_skill_progress(skill.id).unwrap().unwrap();
        assert_eq!(progress.total_minutes_tracked, 25);
        assert_eq!(progress.user_id, 1);
    }
    assert!(skills.get_user_skill_progress(unrelated.id).unwrap().is_none());
}

#[test]
fn accrual_adds_to_existing_progress() {
    let h = Harness::new();
    let skills = skill_service(&h);
    let skill = skills.create_skill("Focus", None).unwrap();
    h.projects.add_project_skill(INBOX_PROJECT_ID, skill.id).unwrap();
    let accrual = SkillProgressAccrual::new(h.store.clone(), h.projects.clone());

    for minutes in [10, 15] {
        let credited = accrual.accrue(&stopped_event(minutes)).unwrap();
        assert_eq!(credited, 1);
    }

    let progress = skills.get_user_skill_progress(skill.id).unwrap().unwrap();
    assert_eq!(progress.total_minutes_tracked, 25);
}

#[test]
fn project_without_skills_accrues_nothing() {
    let h = Harness::new();
    let accrual = SkillProgressAccrual::new(h.store.clone(), h.projects.clone());
    assert_eq!(accrual.accrue(&stopped_event(30)).unwrap(), 0);
}

struct FixedCatalog(Vec<Skill>);

impl SkillCatalog for FixedCatalog {
    fn skills_for_project(&self, _project_id: i64) -> ServiceResult<Vec<Skill>> {
        Ok(self.0.clone())
    }
}

#[test]
fn accrual_for_one_event_is_all_or_nothing() {
    let h = Harness::new();
    let skills = skill_service(&h);
    let real = skills.create_skill("Real", None).unwrap();
    let mut ghost = real.clone();
    ghost.id = 9_999;

    let accrual = SkillProgressAccrual::new(
        h.store.clone(),
        Arc::new(FixedCatalog(vec![real.clone(), ghost])),
    );
    assert!(accrual.accrue(&stopped_event(20)).is_err());
    assert!(skills.get_user_skill_progress(real.id).unwrap().is_none());
}

fn stopped_event(elapsed_minutes: i64) -> CardStopped {
    CardStopped {
        card_id: 1,
        project_id: INBOX_PROJECT_ID,
        user_id: 1,
        elapsed_minutes,
        stopped_at: t0(),
    }
}
