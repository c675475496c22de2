use axum::extract::{Form, State};

use crate::{
    error::{AppError, PlainError},
    models::{AgentConfigForm, InstallConfigForm},
    AppState,
};

pub async fn generate_install_config(
    State(state): State<AppState>,
    Form(form): Form<InstallConfigForm>,
) -> Result<String, PlainError> {
    let mirror = if form.secret_type.as_deref() == Some("mirror_secret") {
        state.mirror_store.load().await
    } else {
        None
    };
    let target = state
        .generator
        .install_config(&form, mirror.as_ref())
        .await
        .map_err(|e| AppError::from(e).into_text())?;
    Ok(format!("✅ install-config.yaml generated at {}", target.display()))
}

pub async fn generate_agent_config(
    State(state): State<AppState>,
    Form(form): Form<AgentConfigForm>,
) -> Result<String, PlainError> {
    let target = state
        .generator
        .agent_config(&form)
        .await
        .map_err(|e| AppError::from(e).into_text())?;
    Ok(format!("✅ agent-config.yaml generated at {}", target.display()))
}
