use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::dom::PageSnapshot;
use crate::fetch::DEFAULT_USER_AGENT;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches raw markup over plain HTTP, without running any page script.
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: Url,
    pub html: String,
    pub truncated: bool,
}

impl StaticFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .context("build static fetch http client")?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> anyhow::Result<FetchedPage> {
        let url = Url::parse(url).with_context(|| format!("parse url: {url}"))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("url scheme must be http/https: {url}");
        }

        let resp = self
            .client
            .get(url.clone())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: HTTP {status}");
        }

        let final_url = resp.url().clone();
        let (html, truncated) = read_text_limited(resp, MAX_BODY_BYTES).await?;
        if truncated {
            tracing::debug!(%final_url, limit = MAX_BODY_BYTES, "html response truncated");
        }

        Ok(FetchedPage {
            final_url,
            html,
            truncated,
        })
    }

    pub async fn snapshot(&self, url: &str) -> anyhow::Result<PageSnapshot> {
        let page = self.fetch(url).await?;
        Ok(PageSnapshot::from_html(&page.html))
    }
}

async fn read_text_limited(
    mut resp: reqwest::Response,
    limit: usize,
) -> anyhow::Result<(String, bool)> {
    let mut out: Vec<u8> = Vec::new();
    let mut truncated = false;

    while let Some(chunk) = resp.chunk().await.context("read response chunk")? {
        if out.len() + chunk.len() > limit {
            let remaining = limit.saturating_sub(out.len());
            out.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        out.extend_from_slice(&chunk);
    }

    Ok((String::from_utf8_lossy(&out).into_owned(), truncated))
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn spawn_page_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let user_agent = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("User-Agent"))
                    .map(|h| h.value.as_str().to_string())
                    .unwrap_or_default();
                let (status, body) = match request.url() {
                    "/pricing" => (200, "<html><body><h1>Plans</h1></body></html>".to_string()),
                    "/ua" => (200, user_agent),
                    "/big" => (200, "x".repeat(MAX_BODY_BYTES + 10)),
                    _ => (404, "not found".to_string()),
                };
                let _ = request.respond(
                    tiny_http::Response::from_string(body).with_status_code(status),
                );
            }
        });

        (base_url, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn fetches_markup_with_desktop_user_agent() {
        let (base_url, shutdown_tx, handle) = spawn_page_server();
        let fetcher = StaticFetcher::new().unwrap();

        let page = fetcher.fetch(&format!("{base_url}/pricing")).await.unwrap();
        assert!(page.html.contains("<h1>Plans</h1>"));
        assert!(!page.truncated);

        let ua = fetcher.fetch(&format!("{base_url}/ua")).await.unwrap();
        assert_eq!(ua.html, DEFAULT_USER_AGENT);

        let _ = shutdown_tx.send(());
        let _ = handle.join();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base_url, shutdown_tx, handle) = spawn_page_server();
        let fetcher = StaticFetcher::new().unwrap();

        let err = fetcher
            .fetch(&format!("{base_url}/missing"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("404"));

        let _ = shutdown_tx.send(());
        let _ = handle.join();
    }

    #[tokio::test]
    async fn oversized_bodies_are_truncated() {
        let (base_url, shutdown_tx, handle) = spawn_page_server();
        let fetcher = StaticFetcher::new().unwrap();

        let page = fetcher.fetch(&format!("{base_url}/big")).await.unwrap();
        assert!(page.truncated);
        assert_eq!(page.html.len(), MAX_BODY_BYTES);

        let _ = shutdown_tx.send(());
        let _ = handle.join();
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = StaticFetcher::new().unwrap();
        assert!(fetcher.fetch("ftp://example.com/").await.is_err());
    }
}
