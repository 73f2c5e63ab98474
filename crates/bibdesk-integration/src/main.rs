//! bibdesk command line
//!
//! Imports a BibDesk library and resolves its attachment links.

use clap::Parser;
use tracing_subscriber::util::SubscriberInitExt;

use bibdesk_integration::cli::{execute, Cli};
use bibdesk_integration::{logging, BibtexManager, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over debug_parser
    let (subscriber, filter) = logging::subscriber();
    subscriber.init();

    let settings = Settings::load(cli.config.as_deref())?;
    filter.apply(&settings)?;

    let manager = BibtexManager::new(settings)?;
    let mut stdout = std::io::stdout().lock();
    execute(&cli.command, &manager, &mut stdout).await?;
    Ok(())
}
