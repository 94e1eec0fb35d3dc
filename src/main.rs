use clap::Parser;
use tracing_subscriber::EnvFilter;

use muninn::cli::Args;
use muninn::config::Config;
use muninn::{gateway, terminal};

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so the
/// transcript owns stdout.
fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load(&args)?;
    init_tracing(&config.logging.filter);

    if args.serve {
        gateway::serve(&config).await?;
        return Ok(());
    }

    terminal::run(&config, args.world.as_deref()).await?;
    Ok(())
}
