mod cmd;
mod output;
mod root;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "relsync",
    about = "Release synchronization engine: mirror release branches, builds and changes into a local store",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest relsync.yaml walking up from the current directory)
    #[arg(long, global = true, env = "RELSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and webhook receiver
    Serve {
        /// Port to listen on (default: server.port from the config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Sync one release against the source host now
    Sync {
        /// Release id or name
        release: String,
    },

    /// Classify a release from its dates without touching the store
    Classify {
        /// Code-freeze instant (RFC 3339)
        #[arg(long)]
        code_freeze: DateTime<Utc>,

        /// Release instant (RFC 3339)
        #[arg(long)]
        release: DateTime<Utc>,

        /// The release has been marked complete
        #[arg(long)]
        complete: bool,

        /// Evaluate as of this instant instead of now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// List tracked releases
    Releases,

    /// Show the recorded sync failures of a release, newest first
    Errors {
        /// Release id or name
        release: String,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Sync { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config_path = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&config_path, port),
        Commands::Sync { release } => cmd::sync::run(&config_path, &release, cli.json),
        Commands::Classify {
            code_freeze,
            release,
            complete,
            now,
        } => cmd::classify::run(code_freeze, release, complete, now, cli.json),
        Commands::Releases => cmd::releases::run(&config_path, cli.json),
        Commands::Errors { release } => cmd::errors::run(&config_path, &release, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
