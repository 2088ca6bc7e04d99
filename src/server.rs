use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Extension, Json, Router,
    extract::{Path as UrlPath, Query, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::{services::ServeDir, set_header::SetResponseHeader, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::error::TileError;
use crate::registry::MapStyle;
use crate::tiles::{MVT_CONTENT_TYPE, TileResponse, TileService};

pub struct AppState {
    pub service: TileService,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(service: TileService, timeout: Duration) -> Self {
        Self { service, timeout }
    }
}

#[derive(Clone)]
struct GroupRoute(Arc<str>);

pub fn router(state: Arc<AppState>, distilled_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/map/layers.json", get(map_style_handler));

    for group in state.service.registry().groups() {
        let handler = get(tile_handler).layer(Extension(GroupRoute(Arc::from(group.name.as_str()))));
        app = app
            .route(&format!("/{}_mvt/:z/:x/:y/", group.name), handler.clone())
            .route(&format!("/{}_mvt/:z/:x/:y", group.name), handler);
    }

    if let Some(dir) = distilled_dir {
        app = app.nest_service(
            "/static/mvts",
            SetResponseHeader::overriding(
                ServeDir::new(dir),
                header::CONTENT_TYPE,
                HeaderValue::from_static(MVT_CONTENT_TYPE),
            ),
        );
    }

    app.layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: Arc<AppState>, listen: SocketAddr, distilled_dir: Option<&Path>) -> Result<()> {
    let app = router(state, distilled_dir);
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(%listen, "map engine listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(GroupRoute(group)): Extension<GroupRoute>,
    UrlPath((z, x, y)): UrlPath<(String, String, String)>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    let filters = match query {
        Ok(Query(filters)) => filters,
        Err(rejection) => {
            warn!(group = %group, error = %rejection, "malformed tile query string");
            return mvt_response(TileResponse::from_result(Err(TileError::MalformedQuery(
                rejection.body_text(),
            ))));
        }
    };

    let service = state.service.clone();
    let task = tokio::task::spawn_blocking(move || service.render(&group, &z, &x, &y, &filters));
    let response = match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!(error = %err, "tile worker failed");
            TileResponse {
                status: 500,
                body: Vec::new(),
            }
        }
        Err(_) => {
            error!(timeout_ms = state.timeout.as_millis() as u64, "tile request timed out");
            TileResponse::from_result(Err(TileError::Timeout))
        }
    };
    mvt_response(response)
}

fn mvt_response(response: TileResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, MVT_CONTENT_TYPE)],
        response.body,
    )
        .into_response()
}

async fn map_style_handler(Extension(state): Extension<Arc<AppState>>) -> Json<MapStyle> {
    Json(state.service.registry().map_style())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
