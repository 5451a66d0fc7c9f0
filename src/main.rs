use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = pricecards::cli::Cli::parse();
    pricecards::logging::init(cli.log_format).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        pricecards::cli::Command::Serve(args) => {
            pricecards::server::run(args).await.context("serve")?;
        }
        pricecards::cli::Command::Scrape(args) => {
            pricecards::scrape::run(args).await.context("scrape")?;
        }
    }

    Ok(())
}
