use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stratum::config::Config;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(version, about = "Monorepo build orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the registered phase chain across all packages
    Run {
        /// Run a single phase (plus its mandatory prerequisites)
        #[arg(short, long)]
        phase: Option<String>,

        /// Resume from the last checkpoint instead of starting fresh
        #[arg(long = "continue")]
        resume: bool,

        /// Substitute a fixed delay for every phase action
        #[arg(long)]
        dry_run: bool,
    },
    /// Watch for changes and recompile incrementally
    Watch,
    /// List packages grouped by dependency level
    List,
    /// Show the persisted checkpoint
    Status,
    /// Delete the persisted checkpoint
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Run {
            phase,
            resume,
            dry_run,
        } => {
            let config = Config::new(&project_dir)?
                .with_resume(resume)
                .with_dry_run(dry_run);
            cmd::cmd_run(&config, phase.as_deref()).await
        }
        Commands::Watch => cmd::cmd_watch(&Config::new(&project_dir)?).await,
        Commands::List => cmd::cmd_list(&Config::new(&project_dir)?),
        Commands::Status => cmd::cmd_status(&Config::new(&project_dir)?),
        Commands::Reset => cmd::cmd_reset(&Config::new(&project_dir)?),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "stratum=debug" } else { "stratum=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}
