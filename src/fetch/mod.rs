//! Headless page fetching.
//!
//! Every scrape launches its own [`BrowserSession`] through a
//! [`BrowserLauncher`], drives it with [`render`] and hands the session back
//! through a [`SessionGuard`] so the browser is closed on every exit path.

pub mod chromium;

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::dom::PageSnapshot;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36";

/// How long navigation waits before it is considered settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// DOM content loaded and the network is almost idle.
    NetworkIdle,
    /// DOM content loaded only.
    DomContentLoaded,
}

impl WaitCondition {
    /// Chromium lifecycle events that must all fire for this condition.
    pub fn lifecycle_events(self) -> &'static [&'static str] {
        match self {
            Self::NetworkIdle => &["DOMContentLoaded", "networkAlmostIdle"],
            Self::DomContentLoaded => &["DOMContentLoaded"],
        }
    }
}

/// Sub-resource classes that are aborted before they load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedResource {
    Image,
    Media,
    Font,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub blocked_resources: Vec<BlockedResource>,
    pub navigation_timeout: Duration,
    pub grace_period: Duration,
    pub extraction_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            blocked_resources: vec![
                BlockedResource::Image,
                BlockedResource::Media,
                BlockedResource::Font,
            ],
            navigation_timeout: Duration::from_millis(8000),
            grace_period: Duration::from_millis(300),
            extraction_timeout: Duration::from_millis(2500),
        }
    }
}

/// Starts isolated browsing sessions. Implementations must never hand the
/// same underlying browser to two sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>>;
}

/// One browser tab owned by one request.
#[async_trait]
pub trait BrowserSession: Send {
    async fn set_user_agent(&mut self, user_agent: &str) -> anyhow::Result<()>;
    async fn block_resources(&mut self, blocked: &[BlockedResource]) -> anyhow::Result<()>;
    /// Navigates and resolves once `wait` is satisfied. Callers bound it with
    /// their own timeout.
    async fn navigate(&mut self, url: &str, wait: WaitCondition) -> anyhow::Result<()>;
    /// Captures the current document in a single read-only pass.
    async fn snapshot(&mut self) -> anyhow::Result<PageSnapshot>;
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Owns a session and closes it exactly once.
///
/// [`SessionGuard::release`] closes in line. If the guard is dropped instead
/// (panic, cancelled future) the close is spawned on the current runtime.
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&mut self) -> &mut dyn BrowserSession {
        self.session
            .as_deref_mut()
            .expect("session is only taken by release or drop")
    }

    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close().await {
                tracing::warn!(?err, "closing browser session failed");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.close().await {
                        tracing::warn!(?err, "closing dropped browser session failed");
                    }
                });
            }
            Err(_) => tracing::warn!("browser session dropped outside a runtime; not closed"),
        }
    }
}

/// Prepares the session and loads `url`, tolerating navigation failures.
///
/// Navigation is tried with [`WaitCondition::NetworkIdle`] and then
/// [`WaitCondition::DomContentLoaded`], each bounded by the navigation
/// timeout. If both fail the page is used as it stands. Setup failures (user
/// agent, resource blocking) are returned.
pub async fn render(
    session: &mut dyn BrowserSession,
    url: &str,
    config: &FetchConfig,
) -> anyhow::Result<()> {
    session
        .set_user_agent(&config.user_agent)
        .await
        .context("set user agent")?;
    if !config.blocked_resources.is_empty() {
        session
            .block_resources(&config.blocked_resources)
            .await
            .context("enable resource blocking")?;
    }

    navigate_best_effort(session, url, config).await;

    tokio::time::sleep(config.grace_period).await;
    Ok(())
}

async fn navigate_best_effort(session: &mut dyn BrowserSession, url: &str, config: &FetchConfig) {
    for wait in [WaitCondition::NetworkIdle, WaitCondition::DomContentLoaded] {
        match tokio::time::timeout(config.navigation_timeout, session.navigate(url, wait)).await {
            Ok(Ok(())) => {
                tracing::debug!(?wait, "navigation settled");
                return;
            }
            Ok(Err(err)) => tracing::debug!(?wait, ?err, "navigation failed"),
            Err(_) => tracing::debug!(
                ?wait,
                timeout_ms = config.navigation_timeout.as_millis() as u64,
                "navigation timed out"
            ),
        }
    }
    tracing::info!(url, "navigation did not settle; extracting from current document");
}
