//! stylesmith CLI: the main entry point.
//!
//! Commands:
//! - `chat` - Interactive or single-message session with the agent
//! - `tools` - Print the tool catalogue
//! - `show` - Print the stored stylesheet and userscript of a site
//! - `init` - Write the default config file

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "stylesmith",
    about = "stylesmith: restyle any website by chatting with a model",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Site whose artifacts are edited, e.g. news.ycombinator.com
    #[arg(short, long, global = true, env = "STYLESMITH_SITE", default_value = "default")]
    site: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List the tools the model can call
    Tools,

    /// Print the stored artifacts of the site
    Show {
        /// Only print one artifact
        #[arg(value_enum)]
        kind: Option<ShowKind>,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ShowKind {
    Css,
    Js,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(&cli.site, message).await?,
        Commands::Tools => commands::tools::run(&cli.site)?,
        Commands::Show { kind } => commands::show::run(&cli.site, kind).await?,
        Commands::Init { force } => commands::init::run(force)?,
    }

    Ok(())
}
