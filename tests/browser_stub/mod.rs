use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pricecards::dom::PageSnapshot;
use pricecards::fetch::{BlockedResource, BrowserLauncher, BrowserSession, WaitCondition};

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationBehavior {
    Settle,
    Hang,
    Fail,
}

#[derive(Debug, Default)]
pub struct StubLog {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub navigated: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl StubLog {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn navigated(&self) -> Vec<String> {
        self.navigated.lock().unwrap().clone()
    }
}

/// Serves a fixed document to every session it launches.
pub struct StubBrowser {
    html: String,
    navigation: NavigationBehavior,
    log: Arc<StubLog>,
}

impl StubBrowser {
    pub fn new(html: impl Into<String>, navigation: NavigationBehavior) -> (Self, Arc<StubLog>) {
        let log = Arc::new(StubLog::default());
        (
            Self {
                html: html.into(),
                navigation,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

#[async_trait]
impl BrowserLauncher for StubBrowser {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            html: self.html.clone(),
            navigation: self.navigation,
            log: Arc::clone(&self.log),
        }))
    }
}

struct StubSession {
    html: String,
    navigation: NavigationBehavior,
    log: Arc<StubLog>,
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn set_user_agent(&mut self, _user_agent: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn block_resources(&mut self, _blocked: &[BlockedResource]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str, _wait: WaitCondition) -> anyhow::Result<()> {
        self.log.navigated.lock().unwrap().push(url.to_string());
        match self.navigation {
            NavigationBehavior::Settle => Ok(()),
            NavigationBehavior::Hang => std::future::pending().await,
            NavigationBehavior::Fail => anyhow::bail!("net::ERR_NAME_NOT_RESOLVED"),
        }
    }

    async fn snapshot(&mut self) -> anyhow::Result<PageSnapshot> {
        Ok(PageSnapshot::from_html(&self.html))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
