use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::fetch::FetchConfig;
use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log output format (stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Scrape one page and print its plans as JSON.
    Scrape(ScrapeArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Chromium-family executable (otherwise detected).
    #[arg(long)]
    pub chromium: Option<PathBuf>,

    #[command(flatten)]
    pub timing: TimingArgs,
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Page URL; `https://` is assumed when no scheme is given.
    #[arg(long)]
    pub url: String,

    /// Fetch raw markup over HTTP instead of rendering in a browser.
    #[arg(long = "static")]
    pub static_only: bool,

    /// Chromium-family executable (otherwise detected).
    #[arg(long)]
    pub chromium: Option<PathBuf>,

    #[command(flatten)]
    pub timing: TimingArgs,
}

#[derive(Debug, Clone, Args)]
pub struct TimingArgs {
    /// Per-attempt navigation timeout.
    #[arg(long, default_value_t = 8000)]
    pub navigation_timeout_ms: u64,

    /// Pause after navigation before the page is read.
    #[arg(long, default_value_t = 300)]
    pub grace_period_ms: u64,

    /// Deadline for snapshot plus extraction.
    #[arg(long, default_value_t = 2500)]
    pub extraction_timeout_ms: u64,
}

impl TimingArgs {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            grace_period: Duration::from_millis(self.grace_period_ms),
            extraction_timeout: Duration::from_millis(self.extraction_timeout_ms),
            ..FetchConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    #[test]
    fn timing_defaults_match_fetch_defaults() {
        let cli = Cli::try_parse_from(["pricecards", "scrape", "--url", "example.com"]).unwrap();
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        let config = args.timing.fetch_config();
        let defaults = FetchConfig::default();
        assert_eq!(config.navigation_timeout, defaults.navigation_timeout);
        assert_eq!(config.grace_period, defaults.grace_period);
        assert_eq!(config.extraction_timeout, defaults.extraction_timeout);
        assert!(!args.static_only);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn serve_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "pricecards",
            "serve",
            "--addr",
            "0.0.0.0:3000",
            "--extraction-timeout-ms",
            "100",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.addr.port(), 3000);
        assert_eq!(
            args.timing.fetch_config().extraction_timeout,
            Duration::from_millis(100)
        );
    }
}
