use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::playlists::UrlQuery;
use crate::error::IngestError;
use crate::models::SyncStatus;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FetchEpgRequest {
    pub url: String,
    /// Refetch even while the stored guide is still valid
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub epg_url: String,
    pub playlist_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammesQuery {
    pub url: String,
    pub channel_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEpgResponse {
    pub url: String,
    pub programmes: usize,
    pub status: SyncStatus,
}

/// POST /api/epg/fetch - Refresh one EPG source
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FetchEpgRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let programmes = state.engine.fetch_epg(&payload.url, payload.force).await?;
    Ok(Json(FetchEpgResponse {
        status: state.engine.epg_status(payload.url.trim()),
        url: payload.url,
        programmes,
    }))
}

/// POST /api/epg/link - Associate an EPG source with a playlist
pub async fn link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LinkRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let changed = state
        .engine
        .link_epg(&payload.epg_url, &payload.playlist_url)
        .await?;
    Ok(Json(serde_json::json!({ "changed": changed })))
}

/// DELETE /api/epg/link - Dissociate an EPG source from a playlist
pub async fn unlink(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LinkRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let changed = state
        .engine
        .unlink_epg(&payload.epg_url, &payload.playlist_url)
        .await?;
    Ok(Json(serde_json::json!({ "changed": changed })))
}

/// DELETE /api/epg?url= - Drop an EPG source's programmes and links
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, IngestError> {
    state.engine.delete_epg(&query.url).await?;
    Ok(Json(serde_json::json!({ "deleted": query.url })))
}

/// GET /api/epg/programmes?url=&channelId= - Guide of one channel
pub async fn programmes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgrammesQuery>,
) -> Result<impl IntoResponse, IngestError> {
    let programmes = state
        .engine
        .programmes_for(&query.url, &query.channel_id)
        .await?;
    Ok(Json(programmes))
}
