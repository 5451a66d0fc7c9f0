//! Chromium sessions driven over CDP with chromiumoxide.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, NavigateParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt as _;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use super::{BlockedResource, BrowserLauncher, BrowserSession, WaitCondition};
use crate::dom::{PageSnapshot, SNAPSHOT_SCRIPT};

pub const CHROMIUM_PATH_ENV: &str = "PRICECARDS_CHROMIUM_PATH";

const WINDOW_WIDTH: u32 = 1366;
const WINDOW_HEIGHT: u32 = 768;

/// Locates a Chromium-family binary.
///
/// Order: explicit path, `PRICECARDS_CHROMIUM_PATH`, well-known names on
/// `PATH`, then the default macOS install.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    if let Ok(raw) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(raw.trim());
        if !raw.trim().is_empty() && path.exists() {
            return Some(path);
        }
    }

    for name in [
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
        "chrome",
        "headless_shell",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let path = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Launches one fresh headless Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: PathBuf,
}

impl ChromiumLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// `None` when no browser binary can be found.
    pub fn detect(explicit: Option<&Path>) -> Option<Self> {
        find_chromium(explicit).map(Self::new)
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
        let profile_dir = tempfile::Builder::new()
            .prefix("pricecards-profile-")
            .tempdir()
            .context("create browser profile dir")?;

        let config = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .user_data_dir(profile_dir.path())
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .viewport(Some(Viewport {
                width: WINDOW_WIDTH,
                height: WINDOW_HEIGHT,
                device_scale_factor: Some(1.0),
                ..Default::default()
            }))
            .no_sandbox()
            .args([
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-background-networking",
                "--ignore-certificate-errors",
                "--no-first-run",
            ])
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .with_context(|| format!("launch chromium: {}", self.executable.display()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });
        tracing::debug!(executable = %self.executable.display(), "launched chromium");

        let page = match open_page(&browser).await {
            Ok(page) => page,
            Err(err) => {
                shutdown(&mut browser).await;
                handler_task.abort();
                return Err(err);
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            interception_task: None,
            profile_dir,
        }))
    }
}

async fn open_page(browser: &Browser) -> anyhow::Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("open browser tab")?;
    page.execute(SetLifecycleEventsEnabledParams::new(true))
        .await
        .context("enable lifecycle events")?;
    Ok(page)
}

async fn shutdown(browser: &mut Browser) {
    if let Err(err) = browser.close().await {
        tracing::debug!(?err, "graceful chromium close failed; killing process");
        if let Some(Err(err)) = browser.kill().await {
            tracing::warn!(?err, "killing chromium process failed");
        }
    }
    if let Err(err) = browser.wait().await {
        tracing::debug!(?err, "waiting for chromium exit failed");
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    interception_task: Option<JoinHandle<()>>,
    profile_dir: TempDir,
}

fn resource_type(resource: BlockedResource) -> ResourceType {
    match resource {
        BlockedResource::Image => ResourceType::Image,
        BlockedResource::Media => ResourceType::Media,
        BlockedResource::Font => ResourceType::Font,
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn set_user_agent(&mut self, user_agent: &str) -> anyhow::Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .context("override user agent")?;
        Ok(())
    }

    async fn block_resources(&mut self, blocked: &[BlockedResource]) -> anyhow::Result<()> {
        let kinds = blocked.iter().copied().map(resource_type).collect::<Vec<_>>();
        let patterns = kinds
            .iter()
            .map(|kind| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(kind.clone())
                    .request_stage(RequestStage::Request)
                    .build()
            })
            .collect::<Vec<_>>();

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("subscribe to paused requests")?;
        self.page
            .execute(EnableParams::builder().patterns(patterns).build())
            .await
            .context("enable request interception")?;

        let page = self.page.clone();
        self.interception_task = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let outcome = if kinds.contains(&event.resource_type) {
                    page.execute(FailRequestParams::new(
                        request_id,
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if let Err(err) = outcome {
                    tracing::trace!(?err, "paused request no longer pending");
                }
            }
        }));
        Ok(())
    }

    async fn navigate(&mut self, url: &str, wait: WaitCondition) -> anyhow::Result<()> {
        let mut lifecycle = self
            .page
            .event_listener::<EventLifecycleEvent>()
            .await
            .context("subscribe to lifecycle events")?;

        let navigation = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .with_context(|| format!("navigate to {url}"))?;
        if let Some(error_text) = navigation.result.error_text.as_deref() {
            anyhow::bail!("navigate to {url}: {error_text}");
        }

        let frame_id = navigation.result.frame_id.clone();
        let loader_id = navigation.result.loader_id.clone();
        let mut pending = wait.lifecycle_events().to_vec();
        while let Some(event) = lifecycle.next().await {
            if event.frame_id != frame_id {
                continue;
            }
            if loader_id.as_ref().is_some_and(|id| *id != event.loader_id) {
                continue;
            }
            pending.retain(|name| *name != event.name);
            if pending.is_empty() {
                return Ok(());
            }
        }

        anyhow::bail!("tab closed before {wait:?} was reached")
    }

    async fn snapshot(&mut self) -> anyhow::Result<PageSnapshot> {
        let params = EvaluateParams::builder()
            .expression(SNAPSHOT_SCRIPT)
            .return_by_value(true)
            .build()
            .map_err(|err| anyhow::anyhow!("build snapshot evaluation: {err}"))?;
        let value: serde_json::Value = self
            .page
            .evaluate_expression(params)
            .await
            .context("evaluate page snapshot")?
            .into_value()
            .map_err(|err| anyhow::anyhow!("decode page snapshot: {err:?}"))?;
        PageSnapshot::from_json(value).context("parse page snapshot")
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
            interception_task,
            profile_dir,
        } = *self;

        if let Some(task) = interception_task {
            task.abort();
        }
        drop(page);
        shutdown(&mut browser).await;
        handler_task.abort();
        drop(profile_dir);
        tracing::debug!("chromium session closed");
        Ok(())
    }
}
