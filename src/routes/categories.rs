use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::playlists::UrlQuery;
use crate::error::IngestError;
use crate::models::CategoryFlags;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub url: String,
    pub category: String,
}

/// `changed: false` means the category has no channels and nothing was written
#[derive(Serialize)]
pub struct ToggleResponse {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<CategoryFlags>,
}

impl From<Option<CategoryFlags>> for ToggleResponse {
    fn from(flags: Option<CategoryFlags>) -> Self {
        Self {
            changed: flags.is_some(),
            flags,
        }
    }
}

/// POST /api/categories/pin - Pin or unpin a category
pub async fn pin(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let flags = state
        .engine
        .pin_or_unpin_category(&payload.url, &payload.category)
        .await?;
    Ok(Json(ToggleResponse::from(flags)))
}

/// POST /api/categories/hide - Hide or unhide a category
pub async fn hide(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let flags = state
        .engine
        .hide_or_unhide_category(&payload.url, &payload.category)
        .await?;
    Ok(Json(ToggleResponse::from(flags)))
}

/// GET /api/categories?url= - Category flags of one playlist
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, IngestError> {
    Ok(Json(state.engine.category_flags(&query.url).await?))
}
