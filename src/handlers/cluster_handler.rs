use axum::{extract::State, response::Json};

use crate::{error::AppError, models::ClusterRecord, AppState};

pub async fn load_cluster_info(State(state): State<AppState>) -> Result<Json<ClusterRecord>, AppError> {
    match state.cluster_store.load().await {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(
            "Cluster information file (cluster_info.json) does not exist.".to_string(),
        )),
    }
}
