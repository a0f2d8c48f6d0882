//! # Server Handlers
//!
//! HTTP route handlers. Handlers only parse input and shape output; the
//! work happens in the orchestrator, the embedder and the catalog.
//!
//! Extractor rejections (bad JSON, bad query string, bad path id) are turned
//! into `422` with a `{"detail": ...}` body like every other error.

use super::AppState;
use crate::{
    catalog::{ListQuery, ModelCreate, ModelListResponse, ModelRecord, ModelUpdate},
    embedding::embed_request,
    error::ServiceError,
    orchestrator::ChatOutcome,
    schemas::{ChatRequest, EmbeddingRequest, EmbeddingResponse},
    streaming::sse_response,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

fn unprocessable(detail: String) -> ServiceError {
    ServiceError::Unprocessable(detail)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| unprocessable(rejection.body_text()))
}

fn model_path(id: Result<Path<u64>, PathRejection>) -> Result<u64, ServiceError> {
    id.map(|Path(id)| id)
        .map_err(|rejection| unprocessable(rejection.body_text()))
}

/// `POST /v1/chat` and `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let request = json_body(payload)?;
    request.check_parameters().map_err(unprocessable)?;

    match state.orchestrator.handle(request).await? {
        ChatOutcome::Complete(response) => Ok(Json(response).into_response()),
        ChatOutcome::Stream(stream) => Ok(sse_response(stream).into_response()),
    }
}

/// `POST /v1/embeddings` and `POST /v1/embed`
pub async fn embeddings(
    State(state): State<AppState>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, ServiceError> {
    let request = json_body(payload)?;
    let response = embed_request(state.embedder.as_ref(), request).await?;
    Ok(Json(response))
}

/// `POST /v1/models`
pub async fn create_model(
    State(state): State<AppState>,
    payload: Result<Json<ModelCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<ModelRecord>), ServiceError> {
    let model = json_body(payload)?;
    model.validate().map_err(unprocessable)?;

    let record = state.catalog.create(model).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /v1/models`
pub async fn list_models(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ModelListResponse>, ServiceError> {
    let Query(query) = query.map_err(|rejection| unprocessable(rejection.body_text()))?;
    query.validate().map_err(unprocessable)?;

    let (items, total) = state.catalog.list(&query).await;
    Ok(Json(ModelListResponse::new(items, total, &query)))
}

/// `GET /v1/models/{id}`
pub async fn get_model(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ModelRecord>, ServiceError> {
    let id = model_path(id)?;
    state
        .catalog
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound("AI model not found".to_string()))
}

/// `PUT /v1/models/{id}`
pub async fn update_model(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ModelUpdate>, JsonRejection>,
) -> Result<Json<ModelRecord>, ServiceError> {
    let id = model_path(id)?;
    let update = json_body(payload)?;
    update.validate().map_err(unprocessable)?;

    Ok(Json(state.catalog.update(id, update).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    /// Deactivate instead of removing
    #[serde(default)]
    pub soft: bool,
}

/// `DELETE /v1/models/{id}?soft=`
pub async fn delete_model(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> Result<StatusCode, ServiceError> {
    let id = model_path(id)?;
    let Query(params) = params.map_err(|rejection| unprocessable(rejection.body_text()))?;

    if params.soft {
        state.catalog.deactivate(id).await?;
    } else {
        state.catalog.delete(id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/models/{id}/activate`
pub async fn activate_model(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ModelRecord>, ServiceError> {
    let id = model_path(id)?;
    Ok(Json(state.catalog.activate(id).await?))
}

/// `POST /v1/models/{id}/deactivate`
pub async fn deactivate_model(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ModelRecord>, ServiceError> {
    let id = model_path(id)?;
    Ok(Json(state.catalog.deactivate(id).await?))
}

/// `GET /v1/`
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the AI Factory API."
    }))
}

/// `GET /v1/health` and `GET /health`
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health_status = json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "ai-factory",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.config().safe_upstream_url(),
    });

    (StatusCode::OK, Json(health_status))
}
