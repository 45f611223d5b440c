mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "evo",
    about = "Autonomous software evolution — detect, validate, and publish improvements",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .evo/ or .git/)
    #[arg(long, global = true, env = "EVO_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize evo in the current project
    Init {
        /// GitHub repository owner
        #[arg(long)]
        owner: Option<String>,

        /// GitHub repository name
        #[arg(long)]
        repo: Option<String>,
    },

    /// Scan the project for improvement opportunities
    Detect,

    /// Run the quality gate against a directory
    Validate {
        /// Directory to validate (default: project root)
        path: Option<PathBuf>,
    },

    /// Run evolution cycles
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show persisted engine state
    State,

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root_path = cli.root.as_deref();
    let root = root::resolve_root(root_path);

    let result = match cli.command {
        Commands::Init { owner, repo } => {
            cmd::init::run(&root, owner.as_deref(), repo.as_deref())
        }
        Commands::Detect => cmd::detect::run(&root, cli.json),
        Commands::Validate { path } => cmd::validate::run(&root, path.as_deref(), cli.json).await,
        Commands::Run { once } => cmd::run::run(&root, once).await,
        Commands::State => cmd::state::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
