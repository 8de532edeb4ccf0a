mod cmd;
mod lock;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    change::ChangeSubcommand, config::ConfigSubcommand, gate::GateSubcommand,
    lane::LaneSubcommand, run::RunArgs,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "openspec",
    about = "Lane-based stage orchestrator: drive changes from proposal to archive with quality gates",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .openspec/ or .git/)
    #[arg(long, global = true, env = "OPENSPEC_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize openspec in the current project
    Init,

    /// Create, list and inspect changes
    Change {
        #[command(subcommand)]
        subcommand: ChangeSubcommand,
    },

    /// Run one or more changes through a lane's stages
    Run(RunArgs),

    /// Show todo progress and the last run of a change
    Status { id: String },

    /// Inspect lanes
    Lane {
        #[command(subcommand)]
        subcommand: LaneSubcommand,
    },

    /// Run or inspect quality gates
    Gate {
        #[command(subcommand)]
        subcommand: GateSubcommand,
    },

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Change { subcommand } => cmd::change::run(&root, subcommand, cli.json),
        Commands::Run(args) => cmd::run::run(&root, args, cli.json),
        Commands::Status { id } => cmd::status::run(&root, &id, cli.json),
        Commands::Lane { subcommand } => cmd::lane::run(&root, subcommand, cli.json),
        Commands::Gate { subcommand } => cmd::gate::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
