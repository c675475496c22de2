use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::RecordError;
use crate::services::action_dispatcher::DispatchError;
use crate::services::config_generator::ConfigError;
use crate::services::mirror_service::MirrorError;
use crate::services::release_service::ReleaseError;
use crate::services::ssh_key_service::KeyError;
use crate::services::store::StoreError;
use crate::services::template_renderer::RenderError;

/// Error surfaced at the HTTP boundary. Each variant fixes the status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    MissingClusterData(String),

    #[error("{0}")]
    UnknownAction(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnknownAction(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MissingClusterData(_) => StatusCode::PRECONDITION_FAILED,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Same status, plain-text body, for the form endpoints.
    pub fn into_text(self) -> PlainError {
        PlainError(self)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug)]
pub struct PlainError(pub AppError);

impl IntoResponse for PlainError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        } else {
            tracing::warn!("{}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::MissingName | KeyError::InvalidName(_) => AppError::Validation(err.to_string()),
            KeyError::AlreadyExists(_) => AppError::Conflict(err.to_string()),
            KeyError::NotFound(_) => AppError::NotFound(err.to_string()),
            KeyError::Generation(_) | KeyError::Io(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownAction(_) => AppError::UnknownAction(err.to_string()),
            DispatchError::NoClusterData | DispatchError::NoMirrorRegistry => {
                AppError::MissingClusterData(err.to_string())
            }
            DispatchError::Record(_) => AppError::Validation(err.to_string()),
            DispatchError::Render(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<MirrorError> for AppError {
    fn from(err: MirrorError) -> Self {
        match err {
            MirrorError::Missing(_) | MirrorError::Invalid(_) | MirrorError::PullSecret(_) => {
                AppError::Validation(err.to_string())
            }
            MirrorError::NotFound(_) => AppError::NotFound(err.to_string()),
            MirrorError::Command(_) => AppError::Upstream(err.to_string()),
            MirrorError::Render(_) | MirrorError::Io { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing(_)
            | ConfigError::Invalid(_)
            | ConfigError::Nodes(_)
            | ConfigError::Number { .. }
            | ConfigError::Workbook(_) => AppError::Validation(err.to_string()),
            ConfigError::Render(_) | ConfigError::Io { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ReleaseError> for AppError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::Fetch(_) => AppError::Upstream(err.to_string()),
            ReleaseError::Io { .. } => AppError::Internal(err.to_string()),
        }
    }
}
