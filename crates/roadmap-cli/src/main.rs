mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    claim::AgentArg, config::ConfigSubcommand, phase::PhaseSubcommand,
    reconcile::ReconcileArgs,
};
use roadmap_core::{paths, ErrorClass, RoadmapError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "roadmap",
    about = "Dependency-gated roadmap phases that concurrent agents claim, release, and complete",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .roadmap/ or .git/)
    #[arg(long, global = true, env = "ROADMAP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log state transitions to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .roadmap/ in the project root
    Init {
        /// Project name (default: root directory name)
        #[arg(long)]
        name: Option<String>,
        /// Markdown file to keep in sync with the roadmap (ROADMAP.md if no path is given)
        #[arg(long, num_args = 0..=1, default_missing_value = paths::DEFAULT_PROJECTION)]
        projection: Option<PathBuf>,
    },

    /// Summarize phases, live claims, and claimable work
    State,

    /// Add, list, and inspect phases
    Phase {
        #[command(subcommand)]
        subcommand: PhaseSubcommand,
    },

    /// List phases that can be claimed right now
    Unblocked,

    /// Claim a phase
    Claim {
        phase: String,
        #[command(flatten)]
        agent: AgentArg,
    },

    /// Claim the first unblocked phase in roadmap order
    Next {
        #[command(flatten)]
        agent: AgentArg,
    },

    /// Give up a claimed phase
    Release {
        phase: String,
        #[command(flatten)]
        agent: AgentArg,
    },

    /// Mark a claimed phase complete
    Complete {
        phase: String,
        #[command(flatten)]
        agent: AgentArg,
    },

    /// Release claims whose lease has run out
    Expire {
        /// Lease in minutes (default: lease.minutes from config)
        #[arg(long)]
        lease_minutes: Option<u32>,
    },

    /// Unblock phases whose dependencies are complete
    Garden,

    /// Apply completion signals observed outside the registry
    Reconcile(ReconcileArgs),

    /// Fix drift between the claim ledger and the roadmap
    Repair,

    /// Show the audit log
    Audit {
        /// Only events for this phase
        #[arg(long)]
        phase: Option<String>,
        /// Only the last N events
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Render the roadmap as markdown
    Render {
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Add phases from a markdown roadmap
    Import { file: PathBuf },

    /// Show or validate .roadmap/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init { name, projection } => {
            cmd::init::run(&root, name.as_deref(), projection.as_deref(), json)
        }
        Commands::State => cmd::state::run(&root, json),
        Commands::Phase { subcommand } => cmd::phase::run(&root, subcommand, json),
        Commands::Unblocked => cmd::phase::unblocked(&root, json),
        Commands::Claim { phase, agent } => cmd::claim::claim(&root, &phase, &agent.agent, json),
        Commands::Next { agent } => cmd::claim::next(&root, &agent.agent, json),
        Commands::Release { phase, agent } => {
            cmd::claim::release(&root, &phase, &agent.agent, json)
        }
        Commands::Complete { phase, agent } => {
            cmd::claim::complete(&root, &phase, &agent.agent, json)
        }
        Commands::Expire { lease_minutes } => cmd::maintenance::expire(&root, lease_minutes, json),
        Commands::Garden => cmd::maintenance::garden(&root, json),
        Commands::Reconcile(args) => cmd::reconcile::run(&root, args, json),
        Commands::Repair => cmd::maintenance::repair(&root, json),
        Commands::Audit { phase, limit } => cmd::audit::run(&root, phase.as_deref(), limit, json),
        Commands::Render { output } => cmd::render::render(&root, output.as_deref(), json),
        Commands::Import { file } => cmd::render::import(&root, &file, json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// 3 for contention, 2 for caller mistakes, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> i32 {
    let class = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<RoadmapError>())
        .map(RoadmapError::class);
    match class {
        Some(ErrorClass::Contention) => 3,
        Some(ErrorClass::Caller) => 2,
        Some(ErrorClass::Integrity) | None => 1,
    }
}
