mod cmd;
mod device;
mod output;
mod root;
mod session;

use clap::{Parser, Subcommand};
use cmd::{check::CheckArgs, config::ConfigSubcommand};
use session::ConnectArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fieldmark",
    about = "Record photo-verified, geotagged attendance check-ins in ERPNext",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .fieldmark/)
    #[arg(long, global = true, env = "FIELDMARK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(flatten)]
    conn: ConnectArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .fieldmark/config.yaml
    Init {
        /// ERPNext site URL, e.g. https://erp.example.com
        #[arg(long)]
        base_url: String,
    },

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Show the signed-in user and their employee record
    Whoami,

    /// List the employees you supervise
    Roster {
        /// Filter by id, name, department or designation
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Record a check-in or check-out with a photo and a location fix
    Check(CheckArgs),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { base_url } => cmd::init::run(&root, &base_url),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Whoami => cmd::whoami::run(&root, &cli.conn, cli.json),
        Commands::Roster { search } => {
            cmd::roster::run(&root, search.as_deref(), &cli.conn, cli.json)
        }
        Commands::Check(args) => cmd::check::run(&root, args, &cli.conn, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
