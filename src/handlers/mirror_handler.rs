use axum::{
    extract::{Form, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    error::{AppError, PlainError},
    models::{
        ApiResponse, CaPayload, ImageSetRequest, ListOperatorsRequest, MirrorRegistryConfig,
        MirrorRegistryForm, OperatorsPayload, PullSecretRequest,
    },
    AppState,
};

fn no_mirror_registry() -> AppError {
    AppError::NotFound("Mirror registry information file (mirror_reg.json) does not exist.".to_string())
}

/// POST /configure-mirror
pub async fn configure_mirror(
    State(state): State<AppState>,
    Form(form): Form<MirrorRegistryForm>,
) -> Result<String, PlainError> {
    let config = MirrorRegistryConfig::from_form(&form)
        .map_err(|e| AppError::Validation(e.to_string()).into_text())?;
    state
        .mirror_store
        .save(&config)
        .await
        .map_err(|e| AppError::from(e).into_text())?;
    info!("Mirror registry set to {}", config.registry_url);
    Ok(format!(
        "✅ Mirror registry information saved to {}",
        state.mirror_store.path().display()
    ))
}

pub async fn load_mirror_secret(State(state): State<AppState>) -> Result<Json<MirrorRegistryConfig>, AppError> {
    state.mirror_store.load().await.map(Json).ok_or_else(no_mirror_registry)
}

pub async fn mirror_pull_secret(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let config = state.mirror_store.load().await.ok_or_else(no_mirror_registry)?;
    Ok(Json(config.pull_secret()))
}

pub async fn get_mirror_ca(State(state): State<AppState>) -> Result<Json<ApiResponse<CaPayload>>, AppError> {
    let ca_content = state.mirror.mirror_ca().await?;
    Ok(Json(ApiResponse::success(CaPayload { ca_content })))
}

pub async fn apply_pull_secret(
    State(state): State<AppState>,
    Json(request): Json<PullSecretRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let message = state.mirror.apply_pull_secret(&request.pull_secret).await?;
    Ok(Json(ApiResponse::message(message)))
}

pub async fn list_operators(
    State(state): State<AppState>,
    Json(request): Json<ListOperatorsRequest>,
) -> Result<Json<ApiResponse<OperatorsPayload>>, AppError> {
    let operators = state
        .mirror
        .list_operators(request.catalog.as_deref(), request.version.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(OperatorsPayload { operators })))
}

pub async fn generate_imageset(
    State(state): State<AppState>,
    Json(request): Json<ImageSetRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let message = state.mirror.generate_imageset(&request).await?;
    Ok(Json(ApiResponse::message(message)))
}

/// POST /api/run-mirror: acknowledges the detached `oc mirror` launch only.
pub async fn run_mirror(State(state): State<AppState>) -> Json<Value> {
    let result = state.mirror.run_mirror().await;
    if result.success {
        Json(json!({ "success": true, "message": result.output }))
    } else {
        Json(json!({ "success": false, "error": result.error }))
    }
}
