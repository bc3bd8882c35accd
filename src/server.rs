use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::ScanConfig,
    ports::{self, PortSelection},
    scanner::Scanner,
    search,
    types::{HostInfo, ScanProgress},
};

/// Scan parameters the dashboard rescans with.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub subnet: String,
    pub config: ScanConfig,
}

#[derive(Clone)]
pub struct AppState {
    scanner: Arc<Scanner>,
    target: Arc<RwLock<ScanTarget>>,
    focused: bool,
}

impl AppState {
    /// `focused` is the default search mode for `/api/results`.
    pub fn new(scanner: Arc<Scanner>, target: ScanTarget, focused: bool) -> Self {
        Self {
            scanner,
            target: Arc::new(RwLock::new(target)),
            focused,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub subnet: String,
    pub complete: bool,
    pub progress: ScanProgress,
    pub vendors: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub focused: Option<bool>,
}

/// Rescan request. Missing fields keep the running configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub start: Option<u16>,
    #[serde(default)]
    pub end: Option<u16>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub ips_only: Option<bool>,
}

/// API routes plus the static dashboard from `ui/`. API responses are never
/// cached since the page polls them.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/results", get(get_results))
        .route("/scan", post(post_scan))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state);

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "dashboard listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let scan_state = app.scanner.state();
    let progress = scan_state.progress().await;
    let complete = scan_state.is_complete().await;
    let results = scan_state.results().await;
    let subnet = app.target.read().await.subnet.clone();
    let out = Status {
        subnet,
        complete,
        progress,
        vendors: search::unique_vendors(&results),
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(
    State(app): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Json<Vec<HostInfo>> {
    let results = app.scanner.state().results().await;
    let focused = query.focused.unwrap_or(app.focused);
    let term = query.q.unwrap_or_default();
    Json(search::filter_hosts(&results, &term, focused))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let target = {
        let current = app.target.read().await;
        match apply_request(&current, req) {
            Ok(t) => t,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };

    match app
        .scanner
        .start_scan(&target.subnet, target.config.clone())
        .await
    {
        Ok(_handle) => {
            *app.target.write().await = target;
            let progress = app.scanner.state().progress().await;
            (StatusCode::ACCEPTED, Json(progress)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "rescan rejected");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

fn apply_request(current: &ScanTarget, req: ScanRequest) -> Result<ScanTarget> {
    let mut next = current.clone();
    if let Some(subnet) = req.subnet {
        next.subnet = subnet;
    }
    let list = match req.ports {
        Some(list) => ports::parse_port_list(&list)?,
        None => Vec::new(),
    };
    if !list.is_empty() {
        next.config.ports = PortSelection::List(list);
    } else if req.start.is_some() || req.end.is_some() {
        let start = req.start.unwrap_or(1);
        let end = req.end.unwrap_or(1024);
        if start == 0 || end == 0 {
            bail!("port range must be within 1-65535");
        }
        if start > end {
            bail!("start port {start} is greater than end port {end}");
        }
        next.config.ports = PortSelection::Range { start, end };
    }
    if let Some(ms) = req.timeout_ms {
        next.config.timeout = Duration::from_millis(ms);
    }
    if let Some(ips_only) = req.ips_only {
        next.config.discovery_only = ips_only;
    }
    Ok(next)
}
