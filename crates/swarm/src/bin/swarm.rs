//! Swarm CLI
//!
//! ```bash
//! # Three prompts, two at a time, in scratch directories
//! swarm run -j 2 "audit src/auth" "audit src/db" "audit src/http"
//!
//! # One git worktree per task, outputs merged into one summary document
//! swarm run --repo . --synthesize --tag audit "review crate a" "review crate b"
//!
//! # Container sandbox
//! swarm run --container --image swarm/agent:latest --prompts-file prompts.txt
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swarm::{
    AgentRunner, AgentTask, CliAgentRunner, GitWorktreeProvider, MarkdownDirSink, Orchestrator,
    ScratchWorkspaceProvider, SwarmConfig, SwarmResult, TaskStatus,
    WorkspaceProvider, select_sandbox,
};
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "swarm")]
#[command(about = "Run independent agent prompts in parallel, isolated workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch of prompts
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Prompts to run, one task each
    prompts: Vec<String>,

    /// Read additional prompts from a file, one per non-empty line
    #[arg(long)]
    prompts_file: Option<PathBuf>,

    /// JSON config file (missing file means defaults)
    #[arg(short, long, default_value = ".swarm/config.json")]
    config: PathBuf,

    /// Give each task a git worktree of this repository
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Directory workspaces are created under
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Directory task outputs are written to
    #[arg(long, default_value = ".swarm/docs")]
    out: PathBuf,

    /// Maximum number of concurrently running tasks
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-task timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Merge completed outputs into one summary document
    #[arg(long)]
    synthesize: bool,

    /// Run agents in containers instead of local processes
    #[arg(long)]
    container: bool,

    /// Container image
    #[arg(long)]
    image: Option<String>,

    /// Extra tag for persisted documents (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Print the final result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    let prompts = collect_prompts(&args).await?;
    if prompts.is_empty() {
        bail!("no prompts given");
    }

    let cwd = std::env::current_dir().context("current directory is not accessible")?;
    let workspace_root = args
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("swarm-workspaces"));
    tokio::fs::create_dir_all(&workspace_root)
        .await
        .with_context(|| format!("cannot create {}", workspace_root.display()))?;

    let workspaces: Arc<dyn WorkspaceProvider> = match &args.repo {
        Some(repo) => Arc::new(GitWorktreeProvider::new(repo, &workspace_root)),
        None => Arc::new(ScratchWorkspaceProvider::new(&workspace_root)),
    };
    let sink = MarkdownDirSink::open(&args.out)
        .await
        .with_context(|| format!("cannot open output directory {}", args.out.display()))?;
    let runner: Arc<dyn AgentRunner> =
        Arc::new(CliAgentRunner::new(config.agent_command.clone()).env(config.env.clone()));

    let orchestrator = Orchestrator::builder()
        .workspaces(workspaces)
        .sandbox(select_sandbox(&config, None))
        .sink(Arc::new(sink))
        .runner(runner)
        .synthesis_dir(args.repo.clone().unwrap_or(cwd))
        .build()?;

    info!(
        tasks = prompts.len(),
        sandbox = orchestrator.sandbox_name(),
        out = %args.out.display(),
        "Launching swarm"
    );

    let total = prompts.len();
    let mut done = 0;
    let result = orchestrator
        .run(prompts, &config, |task| {
            done += 1;
            print_progress(done, total, task);
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result, &args.out);
    }
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<SwarmConfig> {
    let mut config = SwarmConfig::load(&args.config)?;
    if let Some(n) = args.concurrency {
        config = config.max_concurrency(n);
    }
    if let Some(secs) = args.timeout {
        config = config.per_task_timeout(Duration::from_secs(secs));
    }
    if args.synthesize {
        config = config.synthesize(true);
    }
    if args.container || args.image.is_some() {
        let image = args
            .image
            .clone()
            .unwrap_or_else(|| config.sandbox_image.clone());
        config = config.container(image);
    }
    for tag in &args.tags {
        config = config.output_tag(tag);
    }
    config.validate()?;
    Ok(config)
}

async fn collect_prompts(args: &RunArgs) -> Result<Vec<String>> {
    let mut prompts: Vec<String> = args.prompts.clone();
    if let Some(path) = &args.prompts_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read prompts from {}", path.display()))?;
        prompts.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }
    Ok(prompts)
}

fn print_progress(done: usize, total: usize, task: &AgentTask) {
    let secs = task.duration().unwrap_or_default().as_secs_f64();
    match task.status() {
        TaskStatus::Completed => println!(
            "[{done}/{total}] ok     {} ({secs:.1}s) {}",
            task.id().short(),
            task.prompt_preview(60)
        ),
        _ => println!(
            "[{done}/{total}] failed {} ({secs:.1}s) {}: {}",
            task.id().short(),
            task.prompt_preview(60),
            task.error().unwrap_or("unknown error")
        ),
    }
}

fn print_summary(result: &SwarmResult, out: &Path) {
    println!();
    println!(
        "{} completed, {} failed in {:.1}s",
        result.successful_count,
        result.failed_count,
        result.total_duration.as_secs_f64()
    );
    if let Some(cost) = result.total_cost_usd() {
        println!("cost: ${cost:.4}");
    }
    for task in result.completed() {
        if let Some(doc_id) = task.output_doc_id() {
            println!("  {} -> {}/{doc_id}.md", task.id().short(), out.display());
        }
    }
    if let Some(doc_id) = &result.synthesis_doc_id {
        println!("synthesis -> {}/{doc_id}.md", out.display());
    }
}
