// http server - ask the model, keep the history

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::core::{Completion, Db, Exchange, SYSTEM_PROMPT};
use crate::error::{Error, ErrorKind};

/// Shared by every request; built once at startup.
pub struct AppState {
    pub db: Db,
    pub ai: Arc<dyn Completion>,
}

#[derive(Deserialize)]
struct AskRequest {
    user_input: String,
}

#[derive(Serialize)]
struct AskResponse {
    response: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    detail: String,
}

/// Request failure, reduced to what the caller gets to see.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self.0.kind() {
            ErrorKind::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Conversation not found".to_string(),
            ),
            ErrorKind::Internal => {
                tracing::error!(error = ?self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    self.0.to_string(),
                )
            }
        };

        (status, Json(ErrorBody { kind, detail })).into_response()
    }
}

pub struct Server;

impl Server {
    pub async fn run(
        db_url: &str,
        ai: Arc<dyn Completion>,
        host: &str,
        port: u16,
    ) -> Result<(), Error> {
        let db = Db::connect(db_url).await?;
        tracing::info!(dialect = db.dialect_name(), "connected to database");

        let app = Self::router(Arc::new(AppState { db, ai }));

        let addr = format!("{host}:{port}");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        tracing::info!("server running at http://{addr}");

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        Ok(())
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/ask", post(ask))
            .route("/history", get(history))
            .route("/delete/{id}", delete(remove))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to AskAI".to_string(),
    })
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let response = state.ai.complete(SYSTEM_PROMPT, &req.user_input).await?;

    // every stored exchange carries an answer
    if response.is_empty() {
        return Err(Error::Completion("model returned an empty response".into()).into());
    }

    let exchange = state.db.insert(&req.user_input, &response).await?;

    tracing::debug!(id = exchange.id, "stored exchange");
    Ok(Json(AskResponse { response }))
}

async fn history(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Exchange>>, ApiError> {
    Ok(Json(state.db.history().await?))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.db.delete(id).await?;

    tracing::debug!(id, "deleted exchange");
    Ok(Json(MessageResponse {
        message: format!("Conversation with ID {id} deleted successfully."),
    }))
}
