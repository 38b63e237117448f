//! One fully wired core instance over one store.
//!
//! # Responsibility
//! - Build every service around a shared store, bus and clock.
//! - Register event consumers before any card operation runs.
//! - Run the recovery sweep on open and on shutdown.

use crate::clock::{Clock, SystemClock};
use crate::db::Store;
use crate::events::EventBus;
use crate::model::{CardId, UserId, DEFAULT_USER_ID};
use crate::service::card_service::CardService;
use crate::service::focus_timer::{FocusTimer, FocusTimerConfig, IdleNotifier, LogNotifier};
use crate::service::progress_service::ProgressService;
use crate::service::project_service::ProjectService;
use crate::service::recovery::RecoverySweep;
use crate::service::setting_service::SettingService;
use crate::service::skill_service::{SkillProgressAccrual, SkillService};
use crate::service::ServiceResult;
use log::{info, warn};
use std::sync::Arc;
use tokio::runtime::Handle;

pub struct SessionOptions {
    pub user_id: UserId,
    pub focus: FocusTimerConfig,
    pub notifier: Arc<dyn IdleNotifier>,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID,
            focus: FocusTimerConfig::default(),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct Session {
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub projects: Arc<ProjectService>,
    pub cards: Arc<CardService>,
    pub skills: Arc<SkillService>,
    pub settings: Arc<SettingService>,
    pub progress: Arc<ProgressService>,
    pub focus_timer: Arc<FocusTimer>,
    accrual: Arc<SkillProgressAccrual>,
    recovery: RecoverySweep,
}

impl Session {
    /// Wires the services and runs the startup sweep.
    ///
    /// The sweep's `CardStopped` (if any) is published to the freshly
    /// registered consumers like any other stop.
    pub fn open(store: Arc<Store>, runtime: Handle, options: SessionOptions) -> ServiceResult<Self> {
        let SessionOptions {
            user_id,
            focus,
            notifier,
            clock,
        } = options;

        let bus = Arc::new(EventBus::new(runtime.clone()));
        let projects = Arc::new(ProjectService::with_clock(Arc::clone(&store), Arc::clone(&clock)));
        let cards = Arc::new(
            CardService::new(Arc::clone(&store), projects.clone(), Arc::clone(&bus))
                .with_clock(Arc::clone(&clock))
                .with_user_id(user_id),
        );
        let skills = Arc::new(
            SkillService::new(Arc::clone(&store))
                .with_clock(Arc::clone(&clock))
                .with_user_id(user_id),
        );
        let settings = Arc::new(SettingService::new(Arc::clone(&store)));
        let progress = Arc::new(ProgressService::new(Arc::clone(&store)).with_user_id(user_id));

        let accrual = Arc::new(
            SkillProgressAccrual::new(Arc::clone(&store), projects.clone()).with_clock(clock),
        );
        accrual.register_event_handlers(&bus);

        let focus_timer = FocusTimer::new(cards.clone(), settings.clone(), notifier, runtime, focus);
        focus_timer.register_event_handlers(&bus);

        let recovery = RecoverySweep::new(Arc::clone(&cards), Some(Arc::clone(&focus_timer)));
        if let Some(card_id) = recovery.on_startup()? {
            warn!("event=session_open module=session status=ok recovered_card_id={card_id}");
        } else {
            info!("event=session_open module=session status=ok user_id={user_id}");
        }

        Ok(Self {
            store,
            bus,
            projects,
            cards,
            skills,
            settings,
            progress,
            focus_timer,
            accrual,
            recovery,
        })
    }

    pub fn accrual(&self) -> &Arc<SkillProgressAccrual> {
        &self.accrual
    }

    /// Shuts the focus timer down and stops the active card, if any.
    pub fn shutdown(&self) -> ServiceResult<Option<CardId>> {
        let stopped = self.recovery.on_shutdown()?;
        info!(
            "event=session_shutdown module=session status=ok stopped_card_id={}",
            stopped.map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        Ok(stopped)
    }
}
