//! vibe CLI
//!
//! Creates git-worktree sandboxes and runs an agent inside a container for
//! each of them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};

use vibe::naming;
use vibe::sandbox::detect_repo_root;
use vibe::{
    Launcher, Result, RuntimeResolver, SandboxManager, SandboxRecord, Settings,
    SystemRunner,
};

#[derive(Parser, Debug)]
#[command(name = "vibe", version, about = "Sandboxed agent worktrees in containers")]
struct Cli {
    /// Sandbox root directory (defaults to <repo>/.codex-sandboxes)
    #[arg(long, global = true, env = "VIBE_SANDBOX_ROOT")]
    sandbox_root: Option<PathBuf>,

    /// Settings file (defaults to <repo>/.vibe.toml when present)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a sandbox, resolve its runtime and run the agent in it
    Go(GoArgs),
    /// Clean up sandbox resources
    Done(CleanupArgs),
    /// List all sandboxes
    List,
    /// Create a sandbox without starting a container
    #[command(hide = true)]
    Create(CreateArgs),
    /// Run the agent in an existing sandbox
    #[command(hide = true)]
    Run(RunArgs),
    /// Destroy sandboxes, keeping branches unless asked otherwise
    #[command(hide = true)]
    Destroy(CleanupArgs),
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Sandbox name (generated if omitted)
    #[arg(long, default_value = "")]
    name: String,
    /// Base branch or ref (defaults to the current branch)
    #[arg(long)]
    base: Option<String>,
    /// Sandbox branch prefix
    #[arg(long)]
    branch_prefix: Option<String>,
}

#[derive(Args, Debug)]
struct RuntimeArgs {
    /// Image to run, overriding the devcontainer image or build
    #[arg(long)]
    image: Option<String>,
    /// Command executed in the container
    #[arg(long = "cmd")]
    command: Option<String>,
    /// devcontainer.json path relative to the worktree; required to exist when given
    #[arg(long)]
    devcontainer: Option<PathBuf>,
    /// Reuse a previously built devcontainer image with the same tag
    #[arg(long)]
    reuse_image: bool,
}

#[derive(Args, Debug)]
struct GoArgs {
    #[command(flatten)]
    create: CreateArgs,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Sandbox name
    #[arg(long)]
    name: String,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Args, Debug)]
struct CleanupArgs {
    /// Sandbox name
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    name: Option<String>,
    /// Apply to every sandbox
    #[arg(long)]
    all: bool,
    /// Force removal of a dirty worktree and unmerged branch
    #[arg(long)]
    force: bool,
    /// Delete the sandbox branch after removing the worktree
    /// [default: true for `done`, false for `destroy`]
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    delete_branch: Option<bool>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            let code = err.exit_code().unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let repo_root = detect_repo_root(&SystemRunner, &cwd)?;
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::discover(&repo_root)?,
    };
    let manager = SandboxManager::open(
        repo_root,
        cli.sandbox_root.as_deref(),
        settings,
        SystemRunner,
    )?;

    match cli.command {
        Command::Go(args) => {
            let record = create(&manager, &args.create)?;
            start(&manager, &record, &args.runtime).map_err(|err| {
                eprintln!(
                    "sandbox {} is preserved; use `vibe done --name {}` to clean up",
                    record.name, record.name
                );
                err
            })
        }
        Command::Create(args) => create(&manager, &args).map(|_| ()),
        Command::Run(args) => {
            let record = manager.load(&args.name)?;
            start(&manager, &record, &args.runtime)
        }
        Command::Done(args) => cleanup(&manager, &args, true, "done: cleaned"),
        Command::Destroy(args) => cleanup(&manager, &args, false, "destroyed"),
        Command::List => list(&manager),
    }
}

fn create(manager: &SandboxManager, args: &CreateArgs) -> Result<SandboxRecord> {
    let mut name = naming::normalize(&args.name);
    if name.is_empty() {
        name = naming::generate(&manager.settings().name_prefix);
    }
    let base_ref = manager.git().resolve_base_ref(args.base.as_deref())?;

    let record = manager.create(&name, &base_ref, args.branch_prefix.as_deref())?;
    println!("created sandbox {}", record.name);
    println!("worktree: {}", record.worktree_path.display());
    println!("branch:   {}", record.branch);
    Ok(record)
}

fn start(manager: &SandboxManager, record: &SandboxRecord, args: &RuntimeArgs) -> Result<()> {
    let settings = manager.settings().clone();
    let resolver =
        RuntimeResolver::new(settings.clone(), SystemRunner).reuse_images(args.reuse_image);
    let runtime = resolver.resolve(
        &record.worktree_path,
        args.image.as_deref(),
        args.devcontainer.as_deref(),
        args.devcontainer.is_some(),
    )?;

    let command = args.command.clone().unwrap_or_else(|| settings.run_command.clone());
    Launcher::new(settings, SystemRunner).launch(record, &runtime, &command)
}

fn cleanup(
    manager: &SandboxManager,
    args: &CleanupArgs,
    delete_branch_default: bool,
    verb: &str,
) -> Result<()> {
    let delete_branch = args.delete_branch.unwrap_or(delete_branch_default);
    if args.all {
        let (count, result) = manager.destroy_all(args.force, delete_branch);
        println!("{} {} sandbox(es)", verb, count);
        return result;
    }

    let name = args.name.as_deref().unwrap_or_default();
    let record = manager.load(name)?;
    manager.destroy(&record, args.force, delete_branch)?;
    println!("{} sandbox {}", verb, record.name);
    Ok(())
}

fn list(manager: &SandboxManager) -> Result<()> {
    let rows = manager.statuses()?;
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|(record, state)| {
            [
                record.name.clone(),
                record.branch.clone(),
                record.base_ref.clone(),
                record.worktree_path.display().to_string(),
                state.to_string(),
            ]
        })
        .collect();

    let header = ["NAME", "BRANCH", "BASE", "WORKTREE", "STATE"].map(String::from);
    let mut widths = header.clone().map(|h| h.len());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    for row in std::iter::once(&header).chain(cells.iter()) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = w))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{}", line.trim_end());
    }
    Ok(())
}
