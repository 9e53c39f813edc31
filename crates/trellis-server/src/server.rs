//! HTTP server setup and routing

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use trellis_template::{HelperRegistry, HelperSummary, RenderOutput, TemplateValue};

use crate::context::{AppContext, ServerConfig, SharedContext};
use crate::error::{Error, Result};
use crate::request::request_facts;
use crate::watch::{TemplateWatcher, WatchConfig, spawn_watch_loop};

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    template_roots: Vec<String>,
    registered_helpers: usize,
    cached_files: usize,
    cached_includes: usize,
}

/// Render request body
#[derive(Deserialize)]
struct RenderRequest {
    text: String,
    #[serde(default)]
    context: Option<serde_json::Value>,
}

/// Render action result. Exactly one of `text` and `error` is present.
#[derive(Debug, Serialize)]
struct RenderResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RenderResponse {
    fn rendered(text: String) -> Self {
        Self {
            success: true,
            text: Some(text),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            text: None,
            error: Some(error.into()),
        }
    }
}

/// Helper catalog
#[derive(Serialize)]
struct HelpersResponse {
    registered: Vec<HelperSummary>,
    builtins: &'static [&'static str],
}

/// Health check endpoint
async fn health(State(ctx): State<SharedContext>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok",
        template_roots: ctx
            .config()
            .template_roots
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        registered_helpers: ctx.engine().registry().len(),
        cached_files: ctx.cached_files(),
        cached_includes: ctx.engine().cached_includes(),
    };
    Json(response)
}

/// Render a template.
///
/// Every outcome is a `{success, ...}` JSON body: malformed requests get a
/// 400, a render that panics or runs past the timeout gets a 500.
async fn render(
    State(ctx): State<SharedContext>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request: RenderRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RenderResponse::failed(format!("invalid request body: {e}"))),
            );
        }
    };

    let extra = match request.context {
        None | Some(serde_json::Value::Null) => TemplateValue::Null,
        Some(value @ serde_json::Value::Object(_)) => TemplateValue::from(value),
        Some(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RenderResponse::failed("context must be an object")),
            );
        }
    };

    let facts = request_facts(&uri, &headers);
    let engine = Arc::clone(ctx.engine());
    let timeout = ctx.config().render_timeout();
    let task = tokio::task::spawn_blocking(move || {
        engine.render_detailed(&request.text, &facts, extra, 0)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(RenderOutput { text, diagnostics })) => {
            if !diagnostics.is_empty() {
                info!(count = diagnostics.len(), "Render completed with diagnostics");
            }
            (StatusCode::OK, Json(RenderResponse::rendered(text)))
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Render task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RenderResponse::failed("render failed")),
            )
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Render timed out");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RenderResponse::failed(format!(
                    "render timed out after {}ms",
                    timeout.as_millis()
                ))),
            )
        }
    }
}

/// List registered helpers and the built-in catalog
async fn list_helpers(State(ctx): State<SharedContext>) -> impl IntoResponse {
    Json(HelpersResponse {
        registered: ctx.engine().registry().descriptors(),
        builtins: HelperRegistry::builtin_names(),
    })
}

/// 404 handler
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Build the axum router
pub fn build_router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/render", post(render))
        .route("/api/helpers", get(list_helpers))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Run the render service.
///
/// This function blocks until the server is shut down.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let watch = config.watch_enabled.then(|| WatchConfig {
        debounce_ms: config.watch_debounce_ms,
    });

    let ctx = Arc::new(AppContext::new(config)?);

    // Keep the watcher alive for the lifetime of the server
    let _watch_task = match watch {
        Some(watch_config) => {
            let watcher = TemplateWatcher::new(
                ctx.config().config_path.as_deref(),
                &ctx.config().template_roots,
                watch_config,
            )?;
            Some(spawn_watch_loop(Arc::clone(&ctx), watcher))
        }
        None => None,
    };

    let router = build_router(ctx);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Trellis server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    Ok(())
}
