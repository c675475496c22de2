use axum::{extract::State, response::Json};

use crate::{
    error::AppError,
    models::{ApiResponse, CommandRequest, CommandResult, VersionsPayload},
    AppState,
};

pub async fn get_ocp_versions(State(state): State<AppState>) -> Result<Json<ApiResponse<VersionsPayload>>, AppError> {
    let versions = state.releases.versions().await?;
    Ok(Json(ApiResponse::success(VersionsPayload { versions })))
}

/// POST /api/execute-command: unknown keys come back as `success: false`.
pub async fn execute_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandResult> {
    Json(
        state
            .releases
            .execute(&request.command_key, request.version.as_deref())
            .await,
    )
}
