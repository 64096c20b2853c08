//! HTTP backend: `/template` and `/chat` for remote sessions.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use kiln_ai::ChatRequest;
use kiln_build::{Backend, backend::{ErrorBody, TemplateRequest}};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared state for the route handlers
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/template", post(template))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `bind` until the process is interrupted.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "kiln backend listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

/// POST /template - classify the prompt and return the starter bundle.
async fn template(State(state): State<AppState>, Json(request): Json<TemplateRequest>) -> Response {
    match state.backend.template(request.prompt.trim()).await {
        Ok(bundle) => Json(bundle).into_response(),
        Err(e) if e.is_forbidden() => error_response(
            StatusCode::FORBIDDEN,
            ErrorBody {
                message: Some("You cant access this".to_string()),
                ..Default::default()
            },
        ),
        Err(e) => {
            tracing::error!("template generation failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: Some("Failed to generate template response".to_string()),
                    ..Default::default()
                },
            )
        }
    }
}

/// POST /chat - complete the conversation.
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    match state.backend.chat(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::error!("chat failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: Some("Failed to generate chat response".to_string()),
                    details: Some(e.detail()),
                    ..Default::default()
                },
            )
        }
    }
}
