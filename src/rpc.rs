//! Admin HTTP API
//!
//! Every request runs as its own handler task; handlers share the record
//! store and sequence counters through the dispatcher. The caller identity
//! travels in the `X-Caller-Id` header.

use crate::catalog::{CharacterId, FieldUpdate, NewCharacter, Rarity};
use crate::command::{AdminCommand, CommandOutput, Dispatcher};
use crate::config::ServerConfig;
use crate::error::{RegistryError, RegistryResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const CALLER_HEADER: &str = "x-caller-id";

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub img_url: String,
    pub name: String,
    pub anime: String,
    /// Rarity code, as a number (`3`) or a string (`"3"`)
    pub rarity: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegistryError::Unauthorized(_) => StatusCode::FORBIDDEN,
            RegistryError::Validation(_) | RegistryError::InvalidField(_) => {
                StatusCode::BAD_REQUEST
            }
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Unwrap a JSON body once the caller has been authorized
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> RegistryResult<T> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| RegistryError::Validation(rejection.body_text()))
}

fn rarity_code(value: &serde_json::Value) -> RegistryResult<Rarity> {
    match value {
        serde_json::Value::String(code) => Rarity::parse_code(code),
        serde_json::Value::Number(code) => Rarity::parse_code(&code.to_string()),
        other => Err(RegistryError::Validation(format!(
            "invalid rarity {}, use 1 to 5",
            other
        ))),
    }
}

/// Full success or partial success, told apart by status code
fn changed(output: CommandOutput, success: StatusCode) -> Response {
    match output {
        CommandOutput::Changed(outcome) => {
            let status = if outcome.is_partial() {
                StatusCode::ACCEPTED
            } else {
                success
            };
            (status, Json(outcome)).into_response()
        }
        CommandOutput::Record(record) => (StatusCode::OK, Json(record)).into_response(),
    }
}

// ==================== Router ====================

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/characters", post(create_character))
        .route(
            "/characters/:id",
            get(get_character)
                .patch(update_character)
                .delete(delete_character),
        )
        .route("/characters/:id/resync", post(resync_character))
        .route("/commands", post(run_command))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Bind and serve until the process is stopped
pub async fn serve(dispatcher: Arc<Dispatcher>, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Character registry admin API listening on {}", addr);

    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}

// ==================== Handlers ====================

async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sudo_users": dispatcher.guard().sudo_count(),
    }))
}

async fn create_character(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let caller = caller(&headers);
    dispatcher.guard().authorize(&caller)?;

    let req = body(payload)?;
    let rarity = rarity_code(&req.rarity)?;
    let new = NewCharacter::new(&req.img_url, &req.name, &req.anime, rarity)?;

    let output = dispatcher
        .execute(&caller, AdminCommand::Upload(new))
        .await?;
    Ok(changed(output, StatusCode::CREATED))
}

async fn get_character(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let output = dispatcher
        .execute("", AdminCommand::Show(CharacterId::new(id)))
        .await?;
    Ok(changed(output, StatusCode::OK))
}

async fn update_character(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let caller = caller(&headers);
    dispatcher.guard().authorize(&caller)?;

    let req = body(payload)?;
    let update = FieldUpdate::parse(&req.field, &req.value)?;
    let command = AdminCommand::Update {
        id: CharacterId::new(id),
        update,
    };
    let output = dispatcher.execute(&caller, command).await?;
    Ok(changed(output, StatusCode::OK))
}

async fn delete_character(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let caller = caller(&headers);
    let output = dispatcher
        .execute(&caller, AdminCommand::Delete(CharacterId::new(id)))
        .await?;
    Ok(changed(output, StatusCode::OK))
}

async fn resync_character(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let caller = caller(&headers);
    let output = dispatcher
        .execute(&caller, AdminCommand::Resync(CharacterId::new(id)))
        .await?;
    Ok(changed(output, StatusCode::OK))
}

async fn run_command(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Json<CommandResponse> {
    let reply = dispatcher.handle_text(&caller(&headers), &req.text).await;
    Json(CommandResponse { reply })
}
