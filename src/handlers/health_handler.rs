use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};

pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    let health_data = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp(),
        "service": "ocp-bastion-helper",
        "version": env!("CARGO_PKG_VERSION")
    });

    Ok(Json(health_data))
}
