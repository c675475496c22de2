use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::{
    error::{AppError, PlainError},
    models::{SshKeyPayload, SshKeyRequest},
    AppState,
};

/// POST /generate-ssh-key: 200 text, 400 bad name, 409 existing key.
pub async fn generate_ssh_key(
    State(state): State<AppState>,
    Json(request): Json<SshKeyRequest>,
) -> Result<String, PlainError> {
    let public_key = state
        .ssh_keys
        .generate(request.key_name.as_deref())
        .await
        .map_err(|e| AppError::from(e).into_text())?;
    Ok(format!("✅ SSH key created at '{}'", public_key.display()))
}

pub async fn get_ssh_key(
    State(state): State<AppState>,
    Path(key_name): Path<String>,
) -> Result<Json<SshKeyPayload>, AppError> {
    let key = state.ssh_keys.public_key(&key_name).await?;
    Ok(Json(SshKeyPayload { key }))
}
