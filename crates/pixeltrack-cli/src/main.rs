mod deliver;
mod events;
mod script;

use clap::{Parser, Subcommand};
use pixeltrack_core::{AppConfig, ConfigError};
use tracing_subscriber::EnvFilter;

use crate::deliver::DeliverArgs;
use crate::events::EventArgs;

#[derive(Debug, Parser)]
#[command(name = "pixeltrack")]
#[command(about = "Deduplicated pixel event delivery")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score an event payload against its required/optional fields
    Validate {
        #[command(flatten)]
        event: EventArgs,
    },
    /// Print the dedup key an event would get
    DedupKey {
        #[command(flatten)]
        event: EventArgs,
        /// Stable user identifier to anchor the key (defaults to "anonymous")
        #[arg(long)]
        identifier: Option<String>,
        /// Payload encoding before hashing: latin1 or utf8
        #[arg(long, default_value = "latin1")]
        encoding: String,
    },
    /// Validate, deduplicate and deliver an event through both channels
    Track {
        #[command(flatten)]
        event: EventArgs,
        #[command(flatten)]
        deliver: DeliverArgs,
        /// Send the same event this many times to exercise deduplication
        #[arg(long, default_value = "1")]
        repeat: u32,
    },
    /// Send a page view guarded by the durable per-path lock
    PageView {
        /// Logical page path (e.g. /checkout)
        #[arg(long)]
        path: String,
        #[command(flatten)]
        deliver: DeliverArgs,
    },
    /// Pick up email, phone and click id from a landing URL
    SeedUrl {
        /// Full landing URL including query string
        url: String,
    },
    /// Show the stable identifier and current matching fields
    Identity,
}

/// Log filter from the loaded config, `info` when it failed to load.
fn log_level(config: &Result<AppConfig, ConfigError>) -> String {
    config
        .as_ref()
        .map_or_else(|_| "info".to_owned(), |c| c.log_level.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // validate and dedup-key need no config; its errors surface in the
    // commands that do.
    let config = pixeltrack_core::load_app_config();
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level(&config)))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Validate { event }) => events::run_validate(&event)?,
        Some(Commands::DedupKey {
            event,
            identifier,
            encoding,
        }) => events::run_dedup_key(&event, identifier.as_deref(), &encoding)?,
        Some(Commands::Track {
            event,
            deliver,
            repeat,
        }) => {
            let config = config?;
            deliver::run_track(&config, &event, &deliver, repeat).await?;
        }
        Some(Commands::PageView { path, deliver }) => {
            let config = config?;
            deliver::run_page_view(&config, &path, &deliver).await?;
        }
        Some(Commands::SeedUrl { url }) => {
            let config = config?;
            deliver::run_seed_url(&config, &url)?;
        }
        Some(Commands::Identity) => {
            let config = config?;
            deliver::run_identity(&config)?;
        }
        None => println!("pixeltrack ready; run with --help for commands"),
    }

    Ok(())
}
