//! CLI command definitions and handlers

mod apply;
mod learning;
mod plan;
mod rollback;
mod scan;

use crate::history::DEFAULT_WINDOW;
use crate::learning::STATE_DIR;
use crate::policy::PolicyMode;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Default location of the plan written by `archfix plan`
pub const DEFAULT_PLAN_FILE: &str = "patch_plan.json";

/// archfix - architecture smells and guarded refactors for Python projects
#[derive(Parser, Debug)]
#[command(name = "archfix")]
#[command(
    version,
    about = "Find architectural smells in a Python project and apply guarded refactors",
    long_about = "archfix builds the import graph of a Python project, detects god modules, \
hubs, bottlenecks and import cycles, and turns them into a ranked patch plan.\n\n\
Plans pass through a policy gate before anything is written. Every apply run is \
backed up, verified with the project's test command and rolled back when \
verification fails.\n\n\
Run without a subcommand to scan the current directory:\n  \
archfix .",
    after_help = "\
Examples:
  archfix .                               Scan current directory
  archfix scan . --json                   JSON report for scripting
  archfix plan . --action-plan actions.json
  archfix apply . --mode hybrid           Gate, apply, verify, roll back on failure
  archfix apply . --dry-run --json        Show what would change
  archfix rollback .                      Restore the latest backup run
  archfix learning . --whitelist-draft    Draft a whitelist from past successes"
)]
pub struct Cli {
    /// Path to the Python project (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the import graph, report smells, health and trends
    Scan {
        /// Print the full analysis as JSON
        #[arg(long)]
        json: bool,

        /// History window used for trends and regressions
        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        window: usize,

        /// Do not append this scan to .archfix/history.json
        #[arg(long)]
        no_history: bool,
    },

    /// Build a patch plan and write it to disk
    #[command(after_help = "\
Examples:
  archfix plan .                              Write .archfix/patch_plan.json
  archfix plan . --output plan.json           Custom location
  archfix plan . --clean-imports              Also propose unused-import removals
  archfix plan . --action-plan actions.json   Also write the explainable action plan")]
    Plan {
        /// Where to write the plan (default: .archfix/patch_plan.json)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Propose unused-import removals for every module
        #[arg(long)]
        clean_imports: bool,

        /// Also write the architecture/action plan to this path
        #[arg(long)]
        action_plan: Option<PathBuf>,

        /// Print the plan as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Gate a plan through policy, apply it, verify and roll back on failure
    #[command(after_help = "\
Modes:
  assist   keep every operation, decisions are advisory
  hybrid   keep allow and review decisions
  auto     keep allow decisions only

Examples:
  archfix apply .                                 Apply .archfix/patch_plan.json
  archfix apply . --mode auto --verify-cmd 'pytest -x'
  archfix apply . --reject 'a.py|split_module|'   Never propose this operation again")]
    Apply {
        /// Plan to apply (default: .archfix/patch_plan.json, built fresh when missing)
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Policy mode (overrides archfix.toml)
        #[arg(long, value_parser = ["assist", "hybrid", "auto"])]
        mode: Option<String>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Skip backups (disables rollback)
        #[arg(long)]
        no_backup: bool,

        /// Skip the verify command
        #[arg(long)]
        no_verify: bool,

        /// Keep changes even when verification fails
        #[arg(long)]
        no_rollback: bool,

        /// Verify command (overrides config and pyproject.toml)
        #[arg(long)]
        verify_cmd: Option<String>,

        /// Verify timeout in seconds
        #[arg(long)]
        verify_timeout: Option<u64>,

        /// Operation keys (target|kind|location) to reject for this campaign
        #[arg(long)]
        reject: Vec<String>,

        /// Do not skip operations rejected or repeatedly failing in earlier runs
        #[arg(long)]
        ignore_campaign: bool,

        /// Session id for recording approvals and rejections
        #[arg(long)]
        session: Option<String>,

        /// Print the apply report and policy decisions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restore files from a backup run
    Rollback {
        /// Run id to restore (default: latest)
        #[arg(long)]
        run_id: Option<String>,

        /// Print the restore report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List backup runs
    Backups,

    /// Show learning statistics and policy suggestions
    Learning {
        /// Number of deny/whitelist candidates to show
        #[arg(long, default_value = "10")]
        top: usize,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,

        /// Write whitelist candidates to .archfix/operation_whitelist.json
        #[arg(long)]
        whitelist_draft: bool,

        /// Allow drafted entries in auto mode too
        #[arg(long, requires = "whitelist_draft")]
        allow_auto: bool,
    },
}

/// Resolve the project root the way every handler needs it
pub(crate) fn project_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))
}

pub(crate) fn default_plan_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(DEFAULT_PLAN_FILE)
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Scan {
            json,
            window,
            no_history,
        }) => scan::run(&cli.path, json, window, no_history),

        Some(Commands::Plan {
            output,
            clean_imports,
            action_plan,
            json,
        }) => plan::run(
            &cli.path,
            output.as_deref(),
            clean_imports,
            action_plan.as_deref(),
            json,
        ),

        Some(Commands::Apply {
            plan,
            mode,
            dry_run,
            no_backup,
            no_verify,
            no_rollback,
            verify_cmd,
            verify_timeout,
            reject,
            ignore_campaign,
            session,
            json,
        }) => {
            let mode = mode
                .map(|m| m.parse::<PolicyMode>())
                .transpose()
                .context("Invalid --mode")?;
            apply::run(
                &cli.path,
                apply::ApplyArgs {
                    plan,
                    mode,
                    dry_run,
                    backup: !no_backup,
                    verify: !no_verify,
                    auto_rollback: !no_rollback,
                    verify_cmd,
                    verify_timeout,
                    reject,
                    ignore_campaign,
                    session,
                    json,
                },
            )
        }

        Some(Commands::Rollback { run_id, json }) => {
            rollback::run(&cli.path, run_id.as_deref(), json)
        }

        Some(Commands::Backups) => rollback::list(&cli.path),

        Some(Commands::Learning {
            top,
            json,
            whitelist_draft,
            allow_auto,
        }) => learning::run(&cli.path, top, json, whitelist_draft, allow_auto),

        None => scan::run(&cli.path, false, DEFAULT_WINDOW, false),
    }
}
