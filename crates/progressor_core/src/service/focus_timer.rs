//! Idle/focus timer reacting to card start and stop events.
//!
//! # Responsibility
//! - Arm a countdown whenever a card starts timing.
//! - On expiry, ask the user (through an [`IdleNotifier`]) whether to keep
//!   timing or stop the card.
//!
//! # Invariants
//! - All mutable state sits behind one mutex. The guard is never held while
//!   calling the notifier, the settings provider or the card stopper.
//! - Every arm or cancel bumps a generation counter. A countdown only acts
//!   when its generation is still current, so cancelling a countdown that
//!   already fired is a no-op.
//! - Start and stop events are handled concurrently. A stop that arrives
//!   before the start of the same run is remembered, and that late start
//!   does not arm.
//! - Timer state is in-memory only; dangling active cards are the recovery
//!   sweep's concern.

use super::card_service::CardStopper;
use super::setting_service::SettingsProvider;
use crate::events::{CardStarted, CardStopped, DomainEvent, EventBus, Topic};
use crate::model::setting::ACTIVE_CARD_TIMEOUT_KEY;
use crate::model::{CardId, ProjectId};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Fallback idle timeout when the setting is absent or unusable.
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTimerConfig {
    pub default_timeout_minutes: u32,
    /// Wall-clock length of one timeout minute.
    pub minute_length: Duration,
}

impl Default for FocusTimerConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            minute_length: Duration::from_secs(60),
        }
    }
}

/// Reply to an idle prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleAction {
    Continue,
    Stop,
}

/// Idle notice shown when a countdown expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlePrompt {
    pub card_id: CardId,
    pub project_id: ProjectId,
    pub timeout_minutes: u32,
    pub actions: [IdleAction; 2],
}

/// Presentation sink for focus-timer notices.
pub trait IdleNotifier: Send + Sync {
    /// A countdown was armed for `card_id`.
    fn focus_started(&self, _card_id: CardId, _timeout_minutes: u32) {}

    /// Presents `prompt`. Returns `false` when nobody is observing; the
    /// timer then drops back to idle instead of waiting for a reply.
    ///
    /// The reply, when there is one, comes back through
    /// [`FocusTimer::respond`].
    fn idle_timeout(&self, prompt: &IdlePrompt) -> bool;
}

/// Notifier for headless use: logs the prompt and reports no observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl IdleNotifier for LogNotifier {
    fn idle_timeout(&self, prompt: &IdlePrompt) -> bool {
        info!(
            "event=focus_idle_prompt module=focus_timer status=skip card_id={} reason=no_observer",
            prompt.card_id
        );
        false
    }
}

/// Snapshot of the timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Idle,
    Armed { card_id: CardId },
    AwaitingResponse { card_id: CardId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Target {
    card_id: CardId,
    project_id: ProjectId,
}

enum TimerState {
    Idle,
    Armed {
        target: Target,
        countdown: JoinHandle<()>,
    },
    AwaitingResponse {
        target: Target,
    },
}

impl TimerState {
    fn target(&self) -> Option<Target> {
        match self {
            Self::Idle => None,
            Self::Armed { target, .. } | Self::AwaitingResponse { target } => Some(*target),
        }
    }
}

struct TimerInner {
    state: TimerState,
    generation: u64,
    closed: bool,
    /// Latest stop that matched no watched card.
    unmatched_stop: Option<(CardId, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Copy)]
enum ArmReason {
    Started(DateTime<Utc>),
    Resumed,
}

impl TimerInner {
    /// Consumes a remembered stop of `card_id` at or after `started_at`.
    fn take_overtaking_stop(&mut self, card_id: CardId, started_at: DateTime<Utc>) -> bool {
        match self.unmatched_stop {
            Some((stopped, stopped_at)) if stopped == card_id && stopped_at >= started_at => {
                self.unmatched_stop = None;
                true
            }
            _ => false,
        }
    }

    /// Drops back to idle and invalidates any running countdown.
    fn cancel(&mut self) -> Option<Target> {
        self.generation += 1;
        match std::mem::replace(&mut self.state, TimerState::Idle) {
            TimerState::Idle => None,
            TimerState::Armed { target, countdown } => {
                countdown.abort();
                Some(target)
            }
            TimerState::AwaitingResponse { target } => Some(target),
        }
    }
}

pub struct FocusTimer {
    cards: Arc<dyn CardStopper>,
    settings: Arc<dyn SettingsProvider>,
    notifier: Arc<dyn IdleNotifier>,
    runtime: Handle,
    config: FocusTimerConfig,
    inner: Mutex<TimerInner>,
    this: Weak<FocusTimer>,
}

impl FocusTimer {
    pub fn new(
        cards: Arc<dyn CardStopper>,
        settings: Arc<dyn SettingsProvider>,
        notifier: Arc<dyn IdleNotifier>,
        runtime: Handle,
        config: FocusTimerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            cards,
            settings,
            notifier,
            runtime,
            config,
            inner: Mutex::new(TimerInner {
                state: TimerState::Idle,
                generation: 0,
                closed: false,
                unmatched_stop: None,
            }),
            this: this.clone(),
        })
    }

    /// Subscribes to `card:started` and `card:stopped`.
    pub fn register_event_handlers(self: &Arc<Self>, bus: &EventBus) {
        let timer = Arc::downgrade(self);
        bus.subscribe(Topic::CardStarted, move |event| {
            if let (Some(timer), DomainEvent::CardStarted(started)) = (timer.upgrade(), event) {
                timer.handle_card_started(started);
            }
        });

        let timer = Arc::downgrade(self);
        bus.subscribe(Topic::CardStopped, move |event| {
            if let (Some(timer), DomainEvent::CardStopped(stopped)) = (timer.upgrade(), event) {
                timer.handle_card_stopped(stopped);
            }
        });
    }

    /// Arms a fresh countdown for the started card, replacing any other.
    pub fn handle_card_started(&self, event: &CardStarted) {
        let target = Target {
            card_id: event.card_id,
            project_id: event.project_id,
        };
        if let Some(minutes) = self.arm(target, ArmReason::Started(event.started_at)) {
            self.notifier.focus_started(event.card_id, minutes);
        }
    }

    /// Cancels the countdown if it belongs to the stopped card. Otherwise
    /// the stop is remembered in case its start is still in flight.
    pub fn handle_card_stopped(&self, event: &CardStopped) {
        let mut inner = self.lock();
        if inner.state.target().map(|target| target.card_id) != Some(event.card_id) {
            inner.unmatched_stop = Some((event.card_id, event.stopped_at));
            drop(inner);
            debug!(
                "event=focus_cancel module=focus_timer status=skip card_id={} reason=not_current",
                event.card_id
            );
            return;
        }
        inner.cancel();
        drop(inner);
        info!(
            "event=focus_cancel module=focus_timer status=ok card_id={}",
            event.card_id
        );
    }

    /// "Continue": re-arms the countdown for the card that timed out.
    ///
    /// Returns `false` when no card is being watched.
    pub fn resume_timer(&self) -> bool {
        let Some(target) = self.lock().state.target() else {
            debug!("event=focus_resume module=focus_timer status=skip reason=idle");
            return false;
        };
        self.arm(target, ArmReason::Resumed).is_some()
    }

    /// "Stop": cancels the countdown and stops the watched card.
    ///
    /// A failing stop (the card may already be stopped) is logged only.
    /// Returns `false` when no card is being watched.
    pub fn stop_and_deactivate(&self) -> bool {
        let Some(target) = self.lock().cancel() else {
            debug!("event=focus_stop module=focus_timer status=skip reason=idle");
            return false;
        };

        match self.cards.stop_card(target.project_id, target.card_id) {
            Ok(()) => info!(
                "event=focus_stop module=focus_timer status=ok card_id={}",
                target.card_id
            ),
            Err(err) => warn!(
                "event=focus_stop module=focus_timer status=error card_id={} error={err}",
                target.card_id
            ),
        }
        true
    }

    /// Routes an idle-prompt reply.
    pub fn respond(&self, action: IdleAction) -> bool {
        match action {
            IdleAction::Continue => self.resume_timer(),
            IdleAction::Stop => self.stop_and_deactivate(),
        }
    }

    /// Cancels any countdown without touching the card and ignores later
    /// start events.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        let cancelled = inner.cancel();
        drop(inner);
        match cancelled {
            Some(target) => info!(
                "event=focus_shutdown module=focus_timer status=ok card_id={}",
                target.card_id
            ),
            None => info!("event=focus_shutdown module=focus_timer status=ok card_id=none"),
        }
    }

    pub fn status(&self) -> TimerStatus {
        match &self.lock().state {
            TimerState::Idle => TimerStatus::Idle,
            TimerState::Armed { target, .. } => TimerStatus::Armed {
                card_id: target.card_id,
            },
            TimerState::AwaitingResponse { target } => TimerStatus::AwaitingResponse {
                card_id: target.card_id,
            },
        }
    }

    /// Starts a countdown for `target` and returns its length in minutes.
    ///
    /// A resume is skipped unless `target` is still the watched card once the
    /// lock is held. A start is skipped when its run was already stopped.
    fn arm(&self, target: Target, reason: ArmReason) -> Option<u32> {
        let minutes = self.timeout_minutes();
        let delay = self.config.minute_length * minutes;

        let mut inner = self.lock();
        if inner.closed {
            debug!(
                "event=focus_arm module=focus_timer status=skip card_id={} reason=shut_down",
                target.card_id
            );
            return None;
        }
        match reason {
            ArmReason::Resumed if inner.state.target() != Some(target) => {
                debug!(
                    "event=focus_arm module=focus_timer status=skip card_id={} reason=not_current",
                    target.card_id
                );
                return None;
            }
            ArmReason::Started(started_at)
                if inner.take_overtaking_stop(target.card_id, started_at) =>
            {
                debug!(
                    "event=focus_arm module=focus_timer status=skip card_id={} reason=already_stopped",
                    target.card_id
                );
                return None;
            }
            _ => {}
        }

        inner.cancel();
        let generation = inner.generation;
        let timer = self.this.clone();
        let countdown = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(timer) = timer.upgrade() {
                drop(tokio::task::spawn_blocking(move || timer.expire(generation)));
            }
        });
        inner.state = TimerState::Armed { target, countdown };
        drop(inner);

        info!(
            "event=focus_arm module=focus_timer status=ok card_id={} timeout_mins={minutes}",
            target.card_id
        );
        Some(minutes)
    }

    fn expire(&self, generation: u64) {
        let target = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            let TimerState::Armed { target, .. } = inner.state else {
                return;
            };
            inner.state = TimerState::AwaitingResponse { target };
            target
        };

        let minutes = self.timeout_minutes();
        info!(
            "event=focus_expire module=focus_timer status=ok card_id={}",
            target.card_id
        );
        let prompt = IdlePrompt {
            card_id: target.card_id,
            project_id: target.project_id,
            timeout_minutes: minutes,
            actions: [IdleAction::Continue, IdleAction::Stop],
        };
        if self.notifier.idle_timeout(&prompt) {
            return;
        }

        let mut inner = self.lock();
        if inner.generation == generation {
            inner.cancel();
        }
    }

    /// Reads the timeout setting on every arm; unusable values fall back to
    /// the configured default.
    fn timeout_minutes(&self) -> u32 {
        let fallback = self.config.default_timeout_minutes;
        match self.settings.get_setting(ACTIVE_CARD_TIMEOUT_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<u32>() {
                Ok(minutes) if minutes > 0 => minutes,
                _ => {
                    warn!(
                        "event=focus_timeout_setting module=focus_timer status=error value={raw:?} fallback_mins={fallback}"
                    );
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(err) => {
                warn!(
                    "event=focus_timeout_setting module=focus_timer status=error error={err} fallback_mins={fallback}"
                );
                fallback
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FocusTimer {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let TimerState::Armed { countdown, .. } = &inner.state {
            countdown.abort();
        }
    }
}
