use anyhow::{Context, Result};
use aq_processor::cli::{init_logging, run, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref()).context("failed to open log file")?;
    run(cli).await?;
    Ok(())
}
