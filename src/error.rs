/// Failures a scrape can end with.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Invalid or missing url")]
    InvalidUrl,

    /// No headless browser could be located; nothing was launched.
    #[error("headless browser is not available in this environment")]
    BrowserUnavailable,

    #[error("Extraction timeout")]
    ExtractionTimeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScrapeError {
    /// Message shown to HTTP callers.
    pub fn public_message(&self) -> String {
        match self {
            Self::BrowserUnavailable => {
                "Headless browser not available. Try /api/scrape-static for basic scraping."
                    .to_string()
            }
            Self::Other(err) => format!("{err:#}"),
            other => other.to_string(),
        }
    }
}
