//! `progressor` command-line front end.
//!
//! One-shot commands touch the database and exit without running the
//! recovery sweep, so a card started by one invocation keeps timing until a
//! later `card stop`. `focus` runs a full session in the foreground.

use clap::{Args, Parser, Subcommand, ValueEnum};
use progressor_core::CardStatus;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "progressor", version, about = "Card-based time tracking")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log level, overriding the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project management
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Card management and timing
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
    /// Skills and accrued progress
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// Runtime settings
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },
    /// Tracked hours and experience
    Stats {
        /// Days of daily totals to show
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Stop a card left timing by a crashed or killed session
    Cleanup,
    /// Time a card in the foreground with idle prompts
    Focus(FocusArgs),
}

#[derive(Subcommand)]
enum ProjectAction {
    List,
    Add { name: String },
}

#[derive(Subcommand)]
enum CardAction {
    Add {
        title: String,
        #[arg(long, default_value_t = progressor_core::INBOX_PROJECT_ID)]
        project: i64,
        /// Estimated minutes
        #[arg(long, default_value_t = 0)]
        estimate: u32,
    },
    List {
        #[arg(long, default_value_t = progressor_core::INBOX_PROJECT_ID)]
        project: i64,
        #[arg(long, value_enum, default_value_t = StatusArg::Todo)]
        status: StatusArg,
    },
    Show(CardRef),
    Edit {
        #[command(flatten)]
        card: CardRef,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        estimate: Option<i64>,
    },
    /// Mark done (rewards the first completion only)
    Done(CardRef),
    /// Move back to todo
    Undo(CardRef),
    Delete(CardRef),
    Start(CardRef),
    Stop(CardRef),
    /// List the card's time entries
    Entries(CardRef),
    /// Show the card currently timing
    Active,
}

#[derive(Args)]
struct CardRef {
    id: i64,
    #[arg(long, default_value_t = progressor_core::INBOX_PROJECT_ID)]
    project: i64,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Todo,
    Done,
}

impl From<StatusArg> for CardStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Todo => CardStatus::Todo,
            StatusArg::Done => CardStatus::Done,
        }
    }
}

#[derive(Subcommand)]
enum SkillAction {
    List,
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: i64 },
    /// Count a project's tracked time towards a skill
    Link {
        skill: i64,
        #[arg(long, default_value_t = progressor_core::INBOX_PROJECT_ID)]
        project: i64,
    },
    Unlink {
        skill: i64,
        #[arg(long, default_value_t = progressor_core::INBOX_PROJECT_ID)]
        project: i64,
    },
    Progress { skill: i64 },
}

#[derive(Subcommand)]
enum SettingAction {
    List,
    Get { key: String },
    Set {
        key: String,
        value: String,
        #[arg(long, default_value = "")]
        display: String,
    },
}

#[derive(Args)]
struct FocusArgs {
    id: i64,
    #[arg(long, default_value_t = progressor_core::INBOX_PROJECT_ID)]
    project: i64,
}

fn main() {
    let cli = Cli::parse();
    let result = commands::Context::open(cli.config, cli.db, cli.log_level)
        .and_then(|ctx| commands::run(&ctx, cli.command));

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
