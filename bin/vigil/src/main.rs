mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Intent routing and endpoint watching for a desktop assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration and watch store status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect intent detection
    Intent {
        #[command(subcommand)]
        command: IntentCommands,
    },

    /// Inspect and manage watch rules
    Watches {
        #[command(subcommand)]
        command: WatchesCommands,
    },

    /// Inspect detected changes
    Changes {
        #[command(subcommand)]
        command: ChangesCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum IntentCommands {
    /// List the built-in intent rules in evaluation order
    Rules,
    /// Show which rule matches the text and how its target resolves
    Resolve {
        /// Free text, typed or transcribed
        text: String,
    },
}

#[derive(Subcommand)]
enum WatchesCommands {
    /// List watch rules
    List {
        /// Include inactive rules
        #[arg(long)]
        all: bool,
    },
    /// Stop watching an endpoint
    Stop {
        /// Endpoint id (URL, camera id, sensor topic, ...)
        endpoint: String,
    },
    /// Deactivate every rule past its expiry
    Expire,
}

#[derive(Subcommand)]
enum ChangesCommands {
    /// List change records, newest first
    List {
        /// Only changes for this endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Maximum number of records
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Mark a change record as acknowledged
    Ack {
        /// Change record id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_cmd::show().await?,
            ConfigCommands::Init { force } => commands::config_cmd::init(force).await?,
        },
        Commands::Intent { command } => match command {
            IntentCommands::Rules => commands::intent::rules().await?,
            IntentCommands::Resolve { text } => commands::intent::resolve(&text).await?,
        },
        Commands::Watches { command } => match command {
            WatchesCommands::List { all } => commands::watches::list(all).await?,
            WatchesCommands::Stop { endpoint } => commands::watches::stop(&endpoint).await?,
            WatchesCommands::Expire => commands::watches::expire().await?,
        },
        Commands::Changes { command } => match command {
            ChangesCommands::List { endpoint, limit } => {
                commands::changes::list(endpoint.as_deref(), limit).await?
            }
            ChangesCommands::Ack { id } => commands::changes::ack(&id).await?,
        },
    }

    Ok(())
}
