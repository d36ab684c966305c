//! Task orchestration CLI.
//!
//! Routes tasks to engines, isolates them in git worktrees, and reconciles
//! task state between the agent runtime's team store and `.shiki/tasks/`.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use shiki::core::mermaid::Direction;
use shiki::dag::{check_dag, render_all, render_dag};
use shiki::detect::{detect_roles, render_json};
use shiki::exit_codes;
use shiki::io::config::{ShikiConfig, load_config};
use shiki::io::engines::codex_available;
use shiki::io::init::{InitOptions, init_project};
use shiki::io::paths::{ShikiPaths, find_project_root};
use shiki::io::worktree::{CleanupOutcome, CreateOutcome, WorktreeManager};
use shiki::recover::{SaveOptions, recover_session, save_session};
use shiki::route::{format_table, route_all, route_file};
use shiki::sync::{SyncDirection, SyncOptions, format_outcome, sync};
use shiki::validate::validate_project;

#[derive(Parser)]
#[command(
    name = "shiki",
    version,
    about = "Route, isolate and reconcile tasks for a fleet of coding agents"
)]
struct Cli {
    /// Debug-level logging (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.shiki/` (config, tasks, dag, state, schemas).
    Init {
        /// Rewrite config and schemas; task records are kept.
        #[arg(short, long)]
        force: bool,
    },
    /// Pick an engine for a task; prints the engine name on stdout.
    Route {
        /// Task file to route.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        task_file: Option<PathBuf>,
        /// Route every task in `.shiki/tasks/`.
        #[arg(long)]
        all: bool,
        /// Print decisions without writing them back.
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage per-task git worktrees.
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommand,
    },
    /// Reconcile the native team store with `.shiki/tasks/`.
    Sync {
        #[arg(long)]
        team_name: Option<String>,
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value_t = SyncDirection::Both)]
        direction: SyncDirection,
    },
    /// Check `.shiki/` artifacts against schemas, cycles and budgets.
    Validate,
    /// Inspect DAG plans.
    Dag {
        #[command(subcommand)]
        command: DagCommand,
    },
    /// Save or recover session snapshots.
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Print stack hints and suggested team roles as JSON.
    Detect,
}

#[derive(Subcommand)]
enum WorktreeCommand {
    /// Create the worktree for a branch (no-op if it exists).
    Create {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        task_id: String,
    },
    /// Remove the worktree for a branch.
    Cleanup {
        #[arg(long)]
        branch: String,
    },
    /// Merge a branch into the target and restore the current branch.
    Merge {
        #[arg(long)]
        branch: String,
        #[arg(long, default_value = "main")]
        target: String,
    },
    /// Report files changed on more than one branch.
    Conflicts {
        #[arg(long, num_args = 2.., required = true)]
        branches: Vec<String>,
    },
    /// List worktrees and their tasks.
    List,
}

#[derive(Subcommand)]
enum DagCommand {
    /// Fail if the DAG has a cycle; warn on batch-order gaps.
    Check { file: PathBuf },
    /// Print a Mermaid graph and summary.
    Render {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        file: Option<PathBuf>,
        /// Render every DAG in `.shiki/dag/`.
        #[arg(long)]
        all: bool,
        /// Left-to-right layout.
        #[arg(long)]
        lr: bool,
        /// Fence the graph in a ```mermaid block.
        #[arg(long)]
        wrap: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Write a new snapshot to `.shiki/state/`.
    Save {
        #[arg(long, default_value = "cli")]
        mode: String,
        #[arg(long)]
        team_name: Option<String>,
        /// Current lifecycle phase.
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Print a recovery brief from a snapshot (default: the newest).
    Recover { file: Option<PathBuf> },
}

fn main() {
    let cli = Cli::parse();
    shiki::logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Route {
            task_file,
            all,
            dry_run,
        } => cmd_route(task_file.as_deref(), all, dry_run),
        Command::Worktree { command } => cmd_worktree(command),
        Command::Sync {
            team_name,
            dry_run,
            direction,
        } => cmd_sync(
            SyncOptions {
                team_name,
                direction,
                dry_run,
            },
            cli.verbose,
        ),
        Command::Validate => cmd_validate(),
        Command::Dag { command } => cmd_dag(command),
        Command::Session { command } => cmd_session(command),
        Command::Detect => cmd_detect(),
    }
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir().context("read current directory")
}

/// Project paths and config; commands that need `.shiki/` fail without it.
fn project() -> Result<(ShikiPaths, ShikiConfig)> {
    let paths = ShikiPaths::discover()?;
    let config = load_config(&paths.config_path)?;
    Ok((paths, config))
}

/// Config of the enclosing project, or defaults outside one.
fn config_near(start: &Path) -> Result<ShikiConfig> {
    match find_project_root(start) {
        Ok(root) => load_config(&ShikiPaths::new(root).config_path),
        Err(err) => {
            debug!(err = %format!("{err:#}"), "no project config; using defaults");
            Ok(ShikiConfig::default())
        }
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let root = current_dir()?;
    let paths = init_project(&root, &InitOptions { force })?;
    println!("initialized {}", paths.shiki_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_route(task_file: Option<&Path>, all: bool, dry_run: bool) -> Result<i32> {
    let start = match task_file {
        Some(file) => file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(current_dir, |parent| Ok(parent.to_path_buf()))?,
        None => current_dir()?,
    };
    let config = config_near(&start)?;
    let policy = config.routing.policy(codex_available(&config.routing));

    if !all {
        let file = task_file.context("route needs a task file or --all")?;
        let routed = route_file(file, &policy, dry_run)?;
        println!("{}", routed.decision.primary);
        eprintln!(
            "fallback={} reason={}",
            routed.decision.fallback, routed.decision.reason
        );
        return Ok(exit_codes::OK);
    }

    let (paths, _) = project()?;
    let outcome = route_all(&paths.tasks_dir, &policy, dry_run)?;
    print!("{}", format_table(&outcome.routed));
    for error in &outcome.errors {
        eprintln!("skipped {}: {}", error.path.display(), error.message);
    }
    if dry_run {
        eprintln!("dry run: no task files were modified");
    }
    Ok(exit_codes::OK)
}

fn cmd_worktree(command: WorktreeCommand) -> Result<i32> {
    let cwd = current_dir()?;
    let config = config_near(&cwd)?;
    let manager = WorktreeManager::open(&cwd, &config.worktree)?;

    match command {
        WorktreeCommand::Create { branch, task_id } => {
            match manager.create(&branch, &task_id)? {
                CreateOutcome::Created { path, .. } => println!("{}", path.display()),
                CreateOutcome::AlreadyExists { path } => {
                    println!("{}", path.display());
                    eprintln!("worktree already exists");
                }
            }
        }
        WorktreeCommand::Cleanup { branch } => match manager.cleanup(&branch)? {
            CleanupOutcome::Removed { path, discarded } => {
                println!("removed {}", path.display());
                if discarded > 0 {
                    eprintln!("discarded {discarded} uncommitted change(s)");
                }
            }
            CleanupOutcome::NotRegistered { path, .. } => {
                println!("not registered: {}", path.display());
            }
            CleanupOutcome::Pruned { path } => {
                println!("pruned {}", path.display());
                eprintln!("worktree directory was already gone");
            }
        },
        WorktreeCommand::Merge { branch, target } => {
            let outcome = manager.merge(&branch, &target)?;
            if outcome.committed {
                println!("merged {branch} into {target}");
            } else {
                println!("{branch} already merged into {target}");
            }
            match outcome.cleanup {
                Some(CleanupOutcome::Removed { path, .. }) => println!("removed {}", path.display()),
                Some(CleanupOutcome::Pruned { path }) => println!("pruned {}", path.display()),
                Some(CleanupOutcome::NotRegistered { .. }) | None => {}
            }
        }
        WorktreeCommand::Conflicts { branches } => {
            let report = manager.conflicts(&branches)?;
            if report.degraded_base {
                eprintln!("no common merge base; compared against HEAD");
            }
            for branch in &report.skipped {
                eprintln!("skipped missing branch {branch}");
            }
            println!("base: {}", report.base);
            for changes in &report.changes {
                println!("{}: {} file(s) changed", changes.branch, changes.files.len());
            }
            if !report.has_conflicts() {
                println!("no overlapping files");
                return Ok(exit_codes::OK);
            }
            for overlap in &report.overlaps {
                println!("overlap {} <-> {}:", overlap.left, overlap.right);
                for file in &overlap.files {
                    println!("  {file}");
                }
            }
            return Ok(exit_codes::FAILURE);
        }
        WorktreeCommand::List => {
            for entry in manager.list()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.path.display(),
                    entry.branch.as_deref().unwrap_or("(detached)"),
                    entry.task_id.as_deref().unwrap_or("-"),
                    entry.task_status.as_deref().unwrap_or("-"),
                );
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_sync(options: SyncOptions, verbose: bool) -> Result<i32> {
    let (paths, config) = project()?;
    let outcome = sync(&paths, &config, &options)?;
    print!("{}", format_outcome(&outcome, options.dry_run, verbose));
    if !outcome.errors.is_empty() {
        warn!(count = outcome.errors.len(), "some task records were skipped");
    }
    Ok(exit_codes::OK)
}

fn cmd_validate() -> Result<i32> {
    let (paths, config) = project()?;
    let report = validate_project(&paths, &config)?;
    print!("{}", report.render());
    Ok(if report.is_ok() {
        exit_codes::OK
    } else {
        exit_codes::FAILURE
    })
}

fn cmd_dag(command: DagCommand) -> Result<i32> {
    match command {
        DagCommand::Check { file } => {
            let check = check_dag(&file)?;
            print!("{}", check.render());
            for warning in &check.warnings {
                eprintln!("warning: {warning}");
            }
            Ok(exit_codes::OK)
        }
        DagCommand::Render {
            file,
            all,
            lr,
            wrap,
        } => {
            let direction = if lr {
                Direction::LeftToRight
            } else {
                Direction::TopToBottom
            };
            if !all {
                let file = file.context("dag render needs a file or --all")?;
                print!("{}", render_dag(&file, direction, wrap)?);
                return Ok(exit_codes::OK);
            }
            let (paths, _) = project()?;
            let mut code = exit_codes::OK;
            for (path, rendered) in render_all(&paths.dag_dir, direction, wrap)? {
                match rendered {
                    Ok(text) => println!("<!-- {} -->\n{text}", path.display()),
                    Err(err) => {
                        eprintln!("{}: {:#}", path.display(), err);
                        code = exit_codes::FAILURE;
                    }
                }
            }
            Ok(code)
        }
    }
}

fn cmd_session(command: SessionCommand) -> Result<i32> {
    let (paths, config) = project()?;
    match command {
        SessionCommand::Save {
            mode,
            team_name,
            phase,
            notes,
        } => {
            let path = save_session(
                &paths,
                &config,
                &SaveOptions {
                    mode,
                    team_name,
                    phase,
                    notes,
                },
            )?;
            println!("{}", path.display());
        }
        SessionCommand::Recover { file } => {
            print!("{}", recover_session(&paths, &config, file.as_deref())?);
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_detect() -> Result<i32> {
    let cwd = current_dir()?;
    let root = find_project_root(&cwd).unwrap_or(cwd);
    let suggestion = detect_roles(&root)?;
    println!("{}", render_json(&suggestion)?);
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worktree_conflicts_branches() {
        let cli = Cli::parse_from(["shiki", "worktree", "conflicts", "--branches", "a", "b"]);
        match cli.command {
            Command::Worktree {
                command: WorktreeCommand::Conflicts { branches },
            } => assert_eq!(branches, vec!["a".to_string(), "b".to_string()]),
            _ => panic!("expected worktree conflicts"),
        }
    }

    #[test]
    fn conflicts_needs_two_branches() {
        assert!(Cli::try_parse_from(["shiki", "worktree", "conflicts", "--branches", "a"]).is_err());
    }

    #[test]
    fn route_requires_file_or_all() {
        assert!(Cli::try_parse_from(["shiki", "route"]).is_err());
        assert!(Cli::try_parse_from(["shiki", "route", "--all", "--dry-run"]).is_ok());
        assert!(Cli::try_parse_from(["shiki", "route", "t.json", "--all"]).is_err());
    }

    #[test]
    fn sync_direction_values() {
        let cli = Cli::parse_from(["shiki", "sync", "--direction", "to-secondary", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Sync { direction, .. } => assert_eq!(direction, SyncDirection::ToSecondary),
            _ => panic!("expected sync"),
        }
    }
}
