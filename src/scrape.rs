use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::Instrument as _;

use crate::cli::ScrapeArgs;
use crate::dom::PageSnapshot;
use crate::error::ScrapeError;
use crate::extract::{ExtractionLimits, extract_plans};
use crate::fetch::chromium::ChromiumLauncher;
use crate::fetch::{self, BrowserLauncher, BrowserSession, FetchConfig, SessionGuard};
use crate::formats::PlanRecord;
use crate::normalize::normalize_url;
use crate::static_fetch::StaticFetcher;

/// Scrapes pricing plans through a headless browser, one session per call.
pub struct PricingScraper {
    launcher: Option<Arc<dyn BrowserLauncher>>,
    fetch: FetchConfig,
    limits: ExtractionLimits,
}

impl PricingScraper {
    /// `launcher` is `None` when no browser could be provisioned; every scrape
    /// then fails with [`ScrapeError::BrowserUnavailable`].
    pub fn new(launcher: Option<Arc<dyn BrowserLauncher>>) -> Self {
        Self {
            launcher,
            fetch: FetchConfig::default(),
            limits: ExtractionLimits::default(),
        }
    }

    pub fn with_fetch_config(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn browser_available(&self) -> bool {
        self.launcher.is_some()
    }

    pub async fn scrape(&self, raw_url: Option<&str>) -> Result<Vec<PlanRecord>, ScrapeError> {
        let url = normalize_url(raw_url);
        if url.is_empty() {
            return Err(ScrapeError::InvalidUrl);
        }
        let Some(launcher) = self.launcher.as_ref() else {
            return Err(ScrapeError::BrowserUnavailable);
        };

        let span = tracing::info_span!("scrape", request_id = %uuid::Uuid::new_v4(), %url);
        async move {
            let session = launcher
                .launch()
                .await
                .context("launch browser session")?;
            let mut guard = SessionGuard::new(session);
            let outcome = self.scrape_in_session(guard.session(), &url).await;
            guard.release().await;

            match &outcome {
                Ok(plans) => tracing::info!(plans = plans.len(), "scrape finished"),
                Err(err) => tracing::warn!(error = %err, "scrape failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn scrape_in_session(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<Vec<PlanRecord>, ScrapeError> {
        fetch::render(session, url, &self.fetch).await?;
        extract_with_deadline(
            session.snapshot(),
            &self.limits,
            self.fetch.extraction_timeout,
        )
        .await
    }
}

/// Scrapes pricing plans from raw markup, for hosts without a browser.
pub struct StaticScraper {
    fetcher: StaticFetcher,
    limits: ExtractionLimits,
    extraction_timeout: Duration,
}

impl StaticScraper {
    pub fn new(fetcher: StaticFetcher) -> Self {
        Self {
            fetcher,
            limits: ExtractionLimits::default(),
            extraction_timeout: FetchConfig::default().extraction_timeout,
        }
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub async fn scrape(&self, raw_url: Option<&str>) -> Result<Vec<PlanRecord>, ScrapeError> {
        let url = normalize_url(raw_url);
        if url.is_empty() {
            return Err(ScrapeError::InvalidUrl);
        }

        let span = tracing::info_span!("scrape_static", request_id = %uuid::Uuid::new_v4(), %url);
        async move {
            let snapshot = self.fetcher.snapshot(&url).await?;
            tracing::debug!(elements = snapshot.len(), "parsed static markup");
            extract_with_deadline(
                std::future::ready(Ok(snapshot)),
                &self.limits,
                self.extraction_timeout,
            )
            .await
        }
        .instrument(span)
        .await
    }
}

/// Scrapes a single page from the command line and prints the plans as JSON.
pub async fn run(args: ScrapeArgs) -> anyhow::Result<()> {
    let fetch = args.timing.fetch_config();
    let plans = if args.static_only {
        StaticScraper::new(StaticFetcher::new()?)
            .with_extraction_timeout(fetch.extraction_timeout)
            .scrape(Some(&args.url))
            .await?
    } else {
        let launcher = ChromiumLauncher::detect(args.chromium.as_deref())
            .map(|l| Arc::new(l) as Arc<dyn BrowserLauncher>);
        PricingScraper::new(launcher)
            .with_fetch_config(fetch)
            .scrape(Some(&args.url))
            .await
            .map_err(|err| match err {
                ScrapeError::BrowserUnavailable => anyhow::anyhow!(
                    "no headless browser found (set {} or pass --static)",
                    fetch::chromium::CHROMIUM_PATH_ENV
                ),
                other => other.into(),
            })?
    };

    let json = serde_json::to_string_pretty(&plans).context("serialize plans")?;
    println!("{json}");
    Ok(())
}

/// Races snapshot capture plus extraction against `deadline`.
///
/// When the deadline wins the in-flight work is abandoned and nothing it
/// produced is returned.
pub async fn extract_with_deadline<F>(
    snapshot: F,
    limits: &ExtractionLimits,
    deadline: Duration,
) -> Result<Vec<PlanRecord>, ScrapeError>
where
    F: Future<Output = anyhow::Result<PageSnapshot>>,
{
    let limits = limits.clone();
    let work = async move {
        let snapshot = snapshot.await.context("capture page snapshot")?;
        let plans = tokio::task::spawn_blocking(move || extract_plans(&snapshot, &limits))
            .await
            .context("extraction task failed")?;
        anyhow::Ok(plans)
    };

    match tokio::time::timeout(deadline, work).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "extraction deadline elapsed"
            );
            Err(ScrapeError::ExtractionTimeout)
        }
    }
}
