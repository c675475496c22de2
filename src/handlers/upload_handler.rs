use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::Json,
};
use tracing::info;

use crate::{
    error::{AppError, PlainError},
    models::{ApiResponse, ClusterRecord},
    services::config_generator::{read_workbook, NodeRow},
    AppState,
};

/// An uploaded file part: client file name and body.
struct UploadedFile {
    file_name: String,
    content: Bytes,
}

/// Finds the multipart part called `name`. Other parts are skipped.
async fn file_field(multipart: &mut Multipart, name: &str) -> Result<Option<UploadedFile>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed upload: {e}")))?
    {
        if field.name() != Some(name) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;
        return Ok(Some(UploadedFile { file_name, content }));
    }
    Ok(None)
}

fn decode_csv(file: &UploadedFile) -> Result<ClusterRecord, AppError> {
    let text = std::str::from_utf8(&file.content)
        .map_err(|_| AppError::Validation("CSV file must be UTF-8 encoded".to_string()))?;
    Ok(ClusterRecord::from_csv(text)?)
}

async fn store_record(state: &AppState, record: &ClusterRecord) -> Result<(), AppError> {
    state.cluster_store.save(record).await?;
    info!(
        "Stored cluster record with {} fields in {}",
        record.len(),
        state.cluster_store.path().display()
    );
    Ok(())
}

/// POST /upload: node spreadsheet (.xlsx) to JSON rows. Nothing is stored.
pub async fn upload_workbook(mut multipart: Multipart) -> Result<Json<Vec<NodeRow>>, AppError> {
    let file = file_field(&mut multipart, "file")
        .await?
        .ok_or_else(|| AppError::Validation("No file part".to_string()))?;
    if file.file_name.is_empty() {
        return Err(AppError::Validation("No selected file".to_string()));
    }

    let rows = read_workbook(&file.content)?;
    info!("Read {} rows from {}", rows.len(), file.file_name);
    Ok(Json(rows))
}

/// POST /upload-nodes: two-row CSV into the cluster record, plain-text reply.
pub async fn upload_nodes(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<String, PlainError> {
    let file = file_field(&mut multipart, "node_info_file")
        .await
        .map_err(AppError::into_text)?
        .ok_or_else(|| AppError::Validation("No file was uploaded.".to_string()).into_text())?;
    if file.file_name.is_empty() || !file.file_name.to_ascii_lowercase().ends_with(".csv") {
        return Err(AppError::Validation("No file selected or file type not allowed (.csv)".to_string()).into_text());
    }

    let record = decode_csv(&file).map_err(AppError::into_text)?;
    store_record(&state, &record).await.map_err(AppError::into_text)?;
    Ok("✅ Cluster information saved successfully.".to_string())
}

/// POST /upload-csv: same record, JSON reply.
pub async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let file = file_field(&mut multipart, "csv_file")
        .await?
        .ok_or_else(|| AppError::Validation("No file was uploaded.".to_string()))?;
    if file.file_name.is_empty() {
        return Err(AppError::Validation("No file selected.".to_string()));
    }

    let record = decode_csv(&file)?;
    store_record(&state, &record).await?;
    Ok(Json(ApiResponse::message(format!(
        "✅ Cluster information saved to {}",
        state.cluster_store.path().display()
    ))))
}
