use axum::{extract::State, response::Json};

use crate::{
    error::AppError,
    models::{ActionRequest, CommandResult},
    AppState,
};

/// POST /api/configure and /api/execute-action.
///
/// Unknown action names and a missing cluster record are errors; a command that
/// ran and failed is a normal `CommandResult` with `success: false`.
pub async fn execute_action(
    State(state): State<AppState>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<CommandResult>, AppError> {
    let result = state.dispatcher.dispatch(&request.action_type).await?;
    Ok(Json(result))
}
