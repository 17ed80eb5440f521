mod cli;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use psyche::config::PsycheConfig;
use psyche::evolution::types::{NewTurn, SenderClass};

#[derive(Parser)]
#[command(name = "psyche", version, about = "Personality evolution and nightly memory consolidation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the consolidation scheduler until ctrl-c
    Serve,
    /// Claim today's consolidation slot and run it now
    Consolidate,
    /// Show traits, goals, and recent consolidation runs
    Status {
        /// Number of recent runs to show
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
    /// Record a conversational turn (scores it and applies live nudges)
    Record(TurnArgs),
    /// Score a turn without storing it
    Score(TurnArgs),
    /// Show the change history of one trait
    History {
        /// Trait name, e.g. technical_depth
        trait_name: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run database diagnostics
    Doctor,
}

#[derive(Args)]
struct TurnArgs {
    /// Turn text
    content: String,
    #[arg(long, default_value = "operator")]
    sender: String,
    /// operator, federated, or system
    #[arg(long = "class", default_value = "operator")]
    sender_class: SenderClass,
    #[arg(long, default_value = "cli")]
    platform: String,
    /// Mark the turn as a refusal or error message
    #[arg(long)]
    rejection: bool,
}

impl From<TurnArgs> for NewTurn {
    fn from(args: TurnArgs) -> Self {
        NewTurn {
            sender: args.sender,
            sender_class: args.sender_class,
            platform: args.platform,
            content: args.content,
            is_rejection: args.rejection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PsycheConfig::load()?;

    // Log to stderr so report output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => cli::serve::serve(config).await?,
        Command::Consolidate => cli::consolidate::consolidate(config).await?,
        Command::Status { runs } => cli::status::status(&config, runs)?,
        Command::Record(args) => cli::record::record(&config, args.into())?,
        Command::Score(args) => cli::record::score(&config, args.into())?,
        Command::History { trait_name, limit } => cli::history::history(&config, &trait_name, limit)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
