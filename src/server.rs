//! HTTP API: method routing, CORS, shared-secret auth and JSON bodies around
//! the scrapers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::Instrument as _;

use crate::cli::ServeArgs;
use crate::config::ServerConfig;
use crate::error::ScrapeError;
use crate::fetch::chromium::ChromiumLauncher;
use crate::fetch::BrowserLauncher;
use crate::formats::{
    BulkScrapeRequest, BulkScrapeResponse, BulkScrapeResult, ErrorBody, HealthBody, ScrapeRequest,
};
use crate::normalize::normalize_url;
use crate::scrape::{PricingScraper, StaticScraper};
use crate::static_fetch::StaticFetcher;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const MAX_BULK_URLS: usize = 5;

#[derive(Clone)]
pub struct AppState {
    scraper: Arc<PricingScraper>,
    static_scraper: Arc<StaticScraper>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(scraper: PricingScraper, static_scraper: StaticScraper, config: ServerConfig) -> Self {
        Self {
            scraper: Arc::new(scraper),
            static_scraper: Arc::new(static_scraper),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/scrape",
            post(scrape).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/api/scrape-static",
            post(scrape_static)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/scrape/bulk",
            post(scrape_bulk)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/health",
            get(health).options(preflight).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let launcher = ChromiumLauncher::detect(args.chromium.as_deref());
    match &launcher {
        Some(launcher) => {
            tracing::info!(executable = %launcher.executable().display(), "headless browser found")
        }
        None => tracing::warn!("no headless browser found; only /api/scrape-static will succeed"),
    }
    let launcher = launcher.map(|l| Arc::new(l) as Arc<dyn BrowserLauncher>);

    let fetch = args.timing.fetch_config();
    let extraction_timeout = fetch.extraction_timeout;
    let scraper = PricingScraper::new(launcher).with_fetch_config(fetch);
    let static_scraper = StaticScraper::new(StaticFetcher::new()?)
        .with_extraction_timeout(extraction_timeout);

    let config = ServerConfig::from_env();
    if !config.api_key_configured() {
        tracing::warn!("SCRAPER_API_KEY is not set; every scrape request will be rejected");
    }
    tracing::info!(?config, "loaded server config");

    serve(args.addr, AppState::new(scraper, static_scraper, config)).await
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {addr}: {err}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ScrapeError> for ApiError {
    fn from(err: ScrapeError) -> Self {
        let status = match &err {
            ScrapeError::InvalidUrl => StatusCode::BAD_REQUEST,
            ScrapeError::BrowserUnavailable
            | ScrapeError::ExtractionTimeout
            | ScrapeError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.public_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    match HeaderValue::from_str(state.config.allow_origin(origin.as_deref())) {
        Ok(value) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        Err(err) => tracing::warn!(?err, "configured CORS origin is not a valid header value"),
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, x-api-key"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if state.config.is_authorized(provided) {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

/// An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {err}")))
}

/// Runs `work` on its own task so a dropped connection cannot cancel it.
async fn run_detached<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ScrapeError>> + Send + 'static,
{
    tokio::spawn(work.in_current_span())
        .await
        .map_err(|err| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("scrape task failed: {err}"),
            )
        })?
        .map_err(ApiError::from)
}

async fn scrape(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    let request: ScrapeRequest = parse_body(&body)?;

    let scraper = Arc::clone(&state.scraper);
    let plans = run_detached(async move { scraper.scrape(request.url.as_deref()).await }).await?;
    Ok(Json(plans).into_response())
}

async fn scrape_static(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    let request: ScrapeRequest = parse_body(&body)?;

    let scraper = Arc::clone(&state.static_scraper);
    let plans = run_detached(async move { scraper.scrape(request.url.as_deref()).await }).await?;
    Ok(Json(plans).into_response())
}

async fn scrape_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BulkScrapeResponse>, ApiError> {
    authorize(&state, &headers)?;
    let request: BulkScrapeRequest = parse_body(&body)?;

    let targets = request.targets(MAX_BULK_URLS);
    if targets.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No domains provided"));
    }
    if !state.scraper.browser_available() {
        return Err(ScrapeError::BrowserUnavailable.into());
    }

    let scraper = Arc::clone(&state.scraper);
    let results = run_detached(async move {
        let mut results = Vec::with_capacity(targets.len());
        for raw in targets {
            let url = normalize_url(Some(&raw));
            let (plans, error) = match scraper.scrape(Some(&url)).await {
                Ok(plans) => (plans, None),
                Err(err) => (Vec::new(), Some(err.public_message())),
            };
            results.push(BulkScrapeResult {
                url,
                plans,
                error,
                scraped_at: Utc::now(),
            });
        }
        Ok(results)
    })
    .await?;

    let total = results.len();
    let succeeded = results.iter().filter(|r| r.error.is_none()).count();
    tracing::info!(total, succeeded, "bulk scrape finished");
    Ok(Json(BulkScrapeResponse {
        message: format!("Scraped {succeeded} of {total} URLs"),
        results,
        total,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        message: "API is running".to_string(),
        browser_available: state.scraper.browser_available(),
    })
}
