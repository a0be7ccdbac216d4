use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::IngestError;
use crate::services::backup;
use crate::AppState;

/// GET /api/backup - Export the subscription set
///
/// The body is the canonical encoding, so unchanged state downloads as the
/// same bytes.
pub async fn export(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, IngestError> {
    let document = state.engine.export_backup().await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"iptv-hub-backup.json\"",
            ),
        ],
        backup::encode(&document),
    ))
}

/// POST /api/backup - Import a backup document (additive)
pub async fn import(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, IngestError> {
    let document = backup::decode(&body)?;
    let summary = state.engine.import_backup(&document).await?;
    Ok(Json(summary))
}
