//! planboard: command line and headless host for a workspace feature plan.
//!
//! Usage:
//!   planboard show
//!   planboard add backlog "Dark mode"
//!   planboard move dark-mode "In Progress"
//!   planboard --backend git --line feature-plan serve

mod render;
mod serve;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use planboard_core::actor::{commit_identity, git_config, resolve_user_name, user_actor};
use planboard_core::audit_log::AuditLog;
use planboard_core::config::{resolve_config, BackendKind, PlanConfig};
use planboard_core::session::{MutationOutcome, PlanSession};
use planboard_core::storage::artifacts::ExecuteDirIndex;
use planboard_core::storage::git::GitBackend;
use planboard_core::storage::local::FileBackend;
use planboard_core::storage::DocumentBackend;

#[derive(Parser, Debug)]
#[command(name = "planboard")]
#[command(about = "Feature plan board with per-card audit logs")]
struct Cli {
    /// Workspace root holding the plan
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Where the plan document lives (overrides config)
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Git line (branch) holding the plan for the git backend
    #[arg(long)]
    line: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    File,
    Git,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::File => BackendKind::File,
            BackendArg::Git => BackendKind::Git,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board
    Show,
    /// Write an empty plan
    Init,
    /// Add a card to a column
    Add { column_id: String, title: String },
    /// Move a card to another column
    Move { card_id: String, status: String },
    /// Edit a card's fields
    Edit {
        card_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_branch")]
        branch: Option<String>,
        #[arg(long)]
        clear_branch: bool,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a card (its log is kept)
    Delete { card_id: String },
    /// Print a card's audit log, newest first
    Log { card_id: String },
    /// Create the git line holding the plan if it is missing
    EnsureLine,
    /// Run the JSON-lines host loop on stdin/stdout
    Serve,
}

async fn open_git(workspace: &Path, config: &PlanConfig) -> Result<GitBackend> {
    let backend = GitBackend::open(workspace, &config.git_line)
        .await
        .with_context(|| format!("opening git line {}", config.git_line))?;

    let email = git_config(workspace, "user.email").await;
    let name = resolve_user_name(workspace).await;
    Ok(match commit_identity(&name, email.as_deref()) {
        Some((name, email)) => {
            log::info!("[planboard.cli] No user.email configured, committing as {} <{}>", name, email);
            backend.with_identity(&name, &email)
        }
        None => backend,
    })
}

async fn open_backend(workspace: &Path, config: &PlanConfig) -> Result<Box<dyn DocumentBackend>> {
    Ok(match config.backend {
        BackendKind::File => Box::new(FileBackend::new(workspace)),
        BackendKind::Git => Box::new(open_git(workspace, config).await?),
    })
}

async fn open_session(workspace: &Path, config: &PlanConfig) -> Result<PlanSession> {
    let backend = open_backend(workspace, config).await?;
    let actor = user_actor(&resolve_user_name(workspace).await);
    log::debug!("[planboard.cli] Acting as {} on {}", actor, backend.describe());

    Ok(PlanSession::new(
        backend,
        &config.plan_path,
        AuditLog::new(config.logs_path(workspace)),
        Box::new(ExecuteDirIndex::new(config.execute_path(workspace))),
        &actor,
    )
    .with_external_actor(&config.external_actor))
}

fn print_outcome(outcome: MutationOutcome) -> Result<()> {
    match outcome {
        MutationOutcome::Applied(board) => {
            print!("{}", render::board(&board));
            Ok(())
        }
        MutationOutcome::Warning(message) => bail!(message),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = std::fs::canonicalize(&cli.workspace)
        .with_context(|| format!("workspace {}", cli.workspace.display()))?;

    let mut config = resolve_config(&workspace);
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    if let Some(line) = cli.line {
        config.git_line = line;
    }

    match cli.command {
        Command::EnsureLine => {
            let git = open_git(&workspace, &config).await?;
            if git.ensure_line().await? {
                println!("Created line {}", git.line());
            } else {
                println!("Line {} already exists", git.line());
            }
        }
        Command::Init => {
            if config.backend == BackendKind::Git {
                open_git(&workspace, &config).await?.ensure_line().await?;
            }
            let board = open_session(&workspace, &config).await?.init_document().await?;
            print!("{}", render::board(&board));
        }
        Command::Show => {
            let board = open_session(&workspace, &config).await?.load().await?;
            print!("{}", render::board(&board));
        }
        Command::Add { column_id, title } => {
            let mut session = open_session(&workspace, &config).await?;
            print_outcome(session.add_card(&column_id, &title).await?)?;
        }
        Command::Move { card_id, status } => {
            let mut session = open_session(&workspace, &config).await?;
            print_outcome(session.move_card(&card_id, &status).await?)?;
        }
        Command::Edit {
            card_id,
            title,
            branch,
            clear_branch,
            description,
        } => {
            let mut session = open_session(&workspace, &config).await?;
            let board = session.load().await?;
            let Some((_, card)) = board.find_card(&card_id) else {
                bail!("Card \"{}\" not found.", card_id);
            };

            let mut card = card.clone();
            if let Some(title) = title {
                card.title = title;
            }
            if clear_branch {
                card.branch = None;
            } else if branch.is_some() {
                card.branch = branch;
            }
            if description.is_some() {
                card.description = description;
            }
            print_outcome(session.update_card(card).await?)?;
        }
        Command::Delete { card_id } => {
            let mut session = open_session(&workspace, &config).await?;
            print_outcome(session.delete_card(&card_id).await?)?;
        }
        Command::Log { card_id } => {
            let session = open_session(&workspace, &config).await?;
            print!("{}", render::log(&session.read_log(&card_id).await));
        }
        Command::Serve => {
            if config.backend == BackendKind::Git {
                open_git(&workspace, &config).await?.ensure_line().await?;
            }
            let session = open_session(&workspace, &config).await?;
            serve::run(session, &config).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the host protocol in serve mode; env_logger writes to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    run(cli).await
}
