//! Command execution against one opened store.

use super::{CardAction, Commands, FocusArgs, ProjectAction, SettingAction, SkillAction};
use chrono::{DateTime, Utc};
use log::warn;
use progressor_core::model::card::{Card, CardUpdate};
use progressor_core::service::progress_service::ProgressService;
use progressor_core::service::project_service::ProjectService;
use progressor_core::service::setting_service::{SettingService, SettingsProvider};
use progressor_core::service::skill_service::{SkillProgressAccrual, SkillService};
use progressor_core::{
    init_logging, CardService, CardStatus, Clock, CoreConfig, EventBus, IdleAction, IdleNotifier,
    IdlePrompt, Session, SessionOptions, Store, SystemClock,
};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// One store plus the wiring every one-shot command shares.
///
/// The bus carries the skill-progress consumer, so a `card stop` in one
/// invocation credits linked skills like a stop inside a session does.
pub struct Context {
    config: CoreConfig,
    runtime: Runtime,
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    _accrual: Arc<SkillProgressAccrual>,
}

impl Context {
    pub fn open(
        config_path: Option<PathBuf>,
        db_path: Option<PathBuf>,
        log_level: Option<String>,
    ) -> CliResult<Self> {
        let config_path =
            config_path.unwrap_or_else(|| progressor_core::default_data_dir().join("config.toml"));
        let mut config = CoreConfig::load(&config_path)?;
        if let Some(path) = db_path {
            config.database.path = Some(path);
        }
        if let Some(level) = log_level {
            config.logging.level = Some(level);
        }

        if let Err(err) = init_logging(config.log_level(), config.log_dir()) {
            eprintln!("warning: logging disabled: {err}");
        }

        let db_path = config.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(Store::open(&db_path)?);
        Self::with_store(config, store, Arc::new(SystemClock))
    }

    /// Builds the runtime and registers the event consumers over `store`.
    pub fn with_store(
        config: CoreConfig,
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
    ) -> CliResult<Self> {
        let runtime = Builder::new_multi_thread().enable_all().build()?;
        let bus = Arc::new(EventBus::new(runtime.handle().clone()));
        let catalog = Arc::new(ProjectService::with_clock(Arc::clone(&store), Arc::clone(&clock)));
        let accrual = Arc::new(
            SkillProgressAccrual::new(Arc::clone(&store), catalog).with_clock(Arc::clone(&clock)),
        );
        accrual.register_event_handlers(&bus);

        Ok(Self {
            config,
            runtime,
            store,
            clock,
            bus,
            _accrual: accrual,
        })
    }

    fn projects(&self) -> Arc<ProjectService> {
        Arc::new(ProjectService::with_clock(self.store.clone(), self.clock.clone()))
    }

    fn cards(&self) -> CardService {
        CardService::new(self.store.clone(), self.projects(), self.bus.clone())
            .with_clock(self.clock.clone())
            .with_user_id(self.config.user_id)
    }

    fn skills(&self) -> SkillService {
        SkillService::new(self.store.clone())
            .with_clock(self.clock.clone())
            .with_user_id(self.config.user_id)
    }

    /// Blocks until every event published so far has been handled.
    fn flush_events(&self, bus: &EventBus) {
        self.runtime.block_on(bus.flush());
    }
}

/// Runs `command`, then drains the bus so consumers finish before exit.
pub fn run(ctx: &Context, command: Commands) -> CliResult {
    let result = dispatch(ctx, command);
    ctx.flush_events(&ctx.bus);
    result
}

fn dispatch(ctx: &Context, command: Commands) -> CliResult {
    match command {
        Commands::Project { action } => run_project(ctx, action),
        Commands::Card { action } => run_card(ctx, action),
        Commands::Skill { action } => run_skill(ctx, action),
        Commands::Setting { action } => run_setting(ctx, action),
        Commands::Stats { days } => run_stats(ctx, days),
        Commands::Cleanup => {
            match ctx.cards().cleanup()? {
                Some(id) => println!("stopped card {id}"),
                None => println!("no active card"),
            }
            Ok(())
        }
        Commands::Focus(args) => run_focus(ctx, args),
    }
}

fn run_project(ctx: &Context, action: ProjectAction) -> CliResult {
    let projects = ctx.projects();
    match action {
        ProjectAction::List => {
            for project in projects.list_projects()? {
                println!("{:>4}  {}", project.id, project.name);
            }
        }
        ProjectAction::Add { name } => {
            let project = projects.create_project(&name)?;
            println!("created project {}", project.id);
        }
    }
    Ok(())
}

fn run_card(ctx: &Context, action: CardAction) -> CliResult {
    let cards = ctx.cards();
    match action {
        CardAction::Add {
            title,
            project,
            estimate,
        } => {
            let id = cards.add_card(project, &title, estimate)?;
            println!("created card {id}");
        }
        CardAction::List { project, status } => {
            for card in cards.get_all(project, status.into())? {
                print_card_line(&card);
            }
        }
        CardAction::Show(card) => {
            let card = cards.get_card_by_id(card.project, card.id)?;
            print_card_line(&card);
            if let Some(description) = &card.description {
                println!("      {description}");
            }
            println!("      created {}", format_time(card.created_at));
            if let Some(completed_at) = card.completed_at {
                println!("      completed {}", format_time(completed_at));
            }
        }
        CardAction::Edit {
            card,
            title,
            description,
            estimate,
        } => {
            let current = cards.get_card_by_id(card.project, card.id)?;
            let update = CardUpdate {
                title: title.unwrap_or(current.title),
                description: description.or(current.description),
                estimated_mins: estimate.unwrap_or(current.estimated_mins),
            };
            cards.update_card(card.project, card.id, &update)?;
            println!("updated card {}", card.id);
        }
        CardAction::Done(card) => {
            cards.update_card_status(card.project, card.id, CardStatus::Done)?;
            println!("card {} done", card.id);
        }
        CardAction::Undo(card) => {
            cards.update_card_status(card.project, card.id, CardStatus::Todo)?;
            println!("card {} back to todo", card.id);
        }
        CardAction::Delete(card) => {
            cards.delete_card(card.project, card.id)?;
            println!("deleted card {}", card.id);
        }
        CardAction::Start(card) => {
            cards.start_card(card.project, card.id)?;
            println!("timing card {}", card.id);
        }
        CardAction::Stop(card) => {
            cards.stop_card(card.project, card.id)?;
            let stopped = cards.get_card_by_id(card.project, card.id)?;
            println!("stopped card {} ({} min tracked)", card.id, stopped.tracked_mins);
        }
        CardAction::Entries(card) => {
            for entry in cards.list_time_entries(card.project, card.id)? {
                let end = if entry.is_open() {
                    "running".to_string()
                } else {
                    format_time(entry.end_time)
                };
                println!(
                    "{}  ->  {end}  {} min",
                    format_time(entry.start_time),
                    entry.duration_mins
                );
            }
        }
        CardAction::Active => match cards.get_active_card()? {
            Some(card) => print_card_line(&card),
            None => println!("no active card"),
        },
    }
    Ok(())
}

fn run_skill(ctx: &Context, action: SkillAction) -> CliResult {
    let skills = ctx.skills();
    match action {
        SkillAction::List => {
            for skill in skills.get_skills_by_user()? {
                println!("{:>4}  {}", skill.id, skill.name);
            }
        }
        SkillAction::Add { name, description } => {
            let skill = skills.create_skill(&name, description.as_deref())?;
            println!("created skill {}", skill.id);
        }
        SkillAction::Delete { id } => {
            skills.delete_skill(id)?;
            println!("deleted skill {id}");
        }
        SkillAction::Link { skill, project } => {
            skills.get_skill_by_id(skill)?;
            ctx.projects().add_project_skill(project, skill)?;
            println!("project {project} now counts towards skill {skill}");
        }
        SkillAction::Unlink { skill, project } => {
            ctx.projects().remove_project_skill(project, skill)?;
            println!("unlinked skill {skill} from project {project}");
        }
        SkillAction::Progress { skill } => {
            let name = skills.get_skill_by_id(skill)?.name;
            let minutes = skills
                .get_user_skill_progress(skill)?
                .map_or(0, |progress| progress.total_minutes_tracked);
            println!("{name}: {minutes} min");
        }
    }
    Ok(())
}

fn run_setting(ctx: &Context, action: SettingAction) -> CliResult {
    let settings = SettingService::new(ctx.store.clone());
    match action {
        SettingAction::List => {
            for setting in settings.list_settings()? {
                println!("{} = {}  ({})", setting.key, setting.value, setting.display);
            }
        }
        SettingAction::Get { key } => match settings.get_setting(&key)? {
            Some(value) => println!("{value}"),
            None => println!("{key} is not set"),
        },
        SettingAction::Set {
            key,
            value,
            display,
        } => {
            settings.set_setting(&key, &value, &display)?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}

fn run_stats(ctx: &Context, days: u32) -> CliResult {
    let progress = ProgressService::new(ctx.store.clone()).with_user_id(ctx.config.user_id);
    let now = Utc::now();
    let stats = progress.get_stats(now)?;
    println!(
        "week {} h  month {} h  year {} h",
        stats.week_hours, stats.month_hours, stats.year_hours
    );
    println!("experience {}", progress.total_user_exp()?);
    for total in progress.daily_total_minutes(days, now)? {
        println!("{}  {} min", total.day, total.minutes);
    }
    Ok(())
}

/// Prints idle prompts to stdout; replies are read by the focus loop.
struct TerminalNotifier;

impl IdleNotifier for TerminalNotifier {
    fn focus_started(&self, card_id: i64, timeout_minutes: u32) {
        println!("focus timer started for card {card_id} ({timeout_minutes} min)");
    }

    fn idle_timeout(&self, prompt: &IdlePrompt) -> bool {
        println!(
            "still working on card {} after {} min? [c]ontinue / [s]top",
            prompt.card_id, prompt.timeout_minutes
        );
        true
    }
}

fn run_focus(ctx: &Context, args: FocusArgs) -> CliResult {
    let options = SessionOptions {
        user_id: ctx.config.user_id,
        focus: ctx.config.focus_timer(),
        notifier: Arc::new(TerminalNotifier),
        clock: ctx.clock.clone(),
    };
    let session = Session::open(ctx.store.clone(), ctx.runtime.handle().clone(), options)?;
    session.cards.start_card(args.project, args.id)?;
    println!("timing card {}; type `s` to stop, `c` to continue after a prompt", args.id);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let action = match line.trim() {
            "c" | "continue" => IdleAction::Continue,
            "s" | "stop" => break,
            "" => continue,
            other => {
                println!("unknown reply `{other}`");
                continue;
            }
        };
        if !session.focus_timer.respond(action) {
            warn!("event=focus_reply module=cli status=skip reason=no_prompt");
        }
        io::stdout().flush()?;
    }

    let stopped = session.shutdown();
    ctx.flush_events(&session.bus);
    match stopped? {
        Some(id) => {
            let card = session.cards.get_card_by_id(args.project, id)?;
            println!("stopped card {id} ({} min tracked)", card.tracked_mins);
        }
        None => println!("card was already stopped"),
    }
    Ok(())
}

fn print_card_line(card: &Card) {
    let marker = if card.is_active { "*" } else { " " };
    println!(
        "{marker}{:>4}  [{:?}]  {}  {}/{} min",
        card.id, card.status, card.title, card.tracked_mins, card.estimated_mins
    );
}

fn format_time(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::{run, Context};
    use crate::{CardAction, CardRef, Commands, SkillAction};
    use chrono::{Duration, TimeZone, Utc};
    use progressor_core::{CoreConfig, ManualClock, Store, INBOX_PROJECT_ID};
    use std::path::Path;
    use std::sync::Arc;

    fn inbox_card(id: i64) -> CardRef {
        CardRef {
            id,
            project: INBOX_PROJECT_ID,
        }
    }

    fn context(db: &Path, clock: &Arc<ManualClock>) -> Context {
        let store = Arc::new(Store::open(db).unwrap());
        Context::with_store(CoreConfig::default(), store, clock.clone()).unwrap()
    }

    fn card(action: CardAction) -> Commands {
        Commands::Card { action }
    }

    #[test]
    fn stop_in_a_later_invocation_credits_linked_skills() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("progressor.db");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap(),
        ));

        let ctx = context(&db, &clock);
        let setup = [
            Commands::Skill {
                action: SkillAction::Add {
                    name: "Rust".to_string(),
                    description: None,
                },
            },
            Commands::Skill {
                action: SkillAction::Link {
                    skill: 1,
                    project: INBOX_PROJECT_ID,
                },
            },
            card(CardAction::Add {
                title: "write the parser".to_string(),
                project: INBOX_PROJECT_ID,
                estimate: 0,
            }),
            card(CardAction::Start(inbox_card(1))),
        ];
        for command in setup {
            run(&ctx, command).unwrap();
        }
        drop(ctx);

        clock.advance(Duration::minutes(25));
        let ctx = context(&db, &clock);
        run(&ctx, card(CardAction::Stop(inbox_card(1)))).unwrap();

        let progress = ctx.skills().get_user_skill_progress(1).unwrap().unwrap();
        assert_eq!(progress.total_minutes_tracked, 25);
        assert_eq!(ctx.cards().get_card_by_id(INBOX_PROJECT_ID, 1).unwrap().tracked_mins, 25);
    }

    #[test]
    fn cleanup_command_credits_linked_skills() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("progressor.db");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap(),
        ));

        let ctx = context(&db, &clock);
        ctx.skills().create_skill("Writing", None).unwrap();
        ctx.projects().add_project_skill(INBOX_PROJECT_ID, 1).unwrap();
        let card_id = ctx.cards().add_card(INBOX_PROJECT_ID, "draft", 0).unwrap();
        run(&ctx, card(CardAction::Start(inbox_card(card_id)))).unwrap();

        clock.advance(Duration::minutes(12));
        run(&ctx, Commands::Cleanup).unwrap();

        let progress = ctx.skills().get_user_skill_progress(1).unwrap().unwrap();
        assert_eq!(progress.total_minutes_tracked, 12);
    }
}
