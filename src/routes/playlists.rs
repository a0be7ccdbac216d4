use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::IngestError;
use crate::models::SourceKind;
use crate::services::xtream::redact_password;
use crate::AppState;

/// `?url=` selector shared by the playlist-scoped GET/DELETE/PATCH routes
#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeM3uRequest {
    #[serde(default)]
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeXtreamRequest {
    #[serde(default)]
    pub title: String,
    pub server: String,
    pub username: String,
    pub password: String,
    /// `live` | `vod` | `series` (or the `xtream-*` forms); all three when absent
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub url: String,
    /// Return immediately and sync in the background
    #[serde(default)]
    pub background: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlaylistRequest {
    #[serde(default)]
    pub title: Option<String>,
    /// Empty string clears the custom user agent
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub url: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
}

/// GET /api/playlists - All subscribed playlists
pub async fn list_playlists(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, IngestError> {
    let playlists = state.engine.list_playlists().await?;
    Ok(Json(playlists))
}

/// POST /api/playlists/m3u - Subscribe to an M3U playlist and sync it
pub async fn subscribe_m3u(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubscribeM3uRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let channels = state
        .engine
        .subscribe_m3u(&payload.title, &payload.url)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SyncResponse {
            url: payload.url.trim().to_string(),
            status: "complete",
            channels: Some(channels),
        }),
    ))
}

/// POST /api/playlists/xtream - Subscribe to an Xtream panel and sync it
pub async fn subscribe_xtream(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubscribeXtreamRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let kind = match payload.kind.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(SourceKind::parse(raw).ok_or_else(|| {
            IngestError::InvalidInput(format!("unknown Xtream kind: {}", raw))
        })?),
    };

    let channels = state
        .engine
        .subscribe_xtream(
            &payload.title,
            &payload.server,
            &payload.username,
            &payload.password,
            kind,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "server": payload.server.trim(),
            "status": "complete",
            "channels": channels,
        })),
    ))
}

/// POST /api/playlists/refresh - Sync one playlist
///
/// With `background: true` the sync is spawned and the client polls
/// /api/playlists/status for the outcome.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, IngestError> {
    if !payload.background {
        let channels = state.engine.refresh(&payload.url).await?;
        return Ok((
            StatusCode::OK,
            Json(SyncResponse {
                url: payload.url,
                status: "complete",
                channels: Some(channels),
            }),
        ));
    }

    // Surface unknown playlists now rather than through the status route
    state.engine.status(&payload.url).await?;

    let engine = state.engine.clone();
    let url = payload.url.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.refresh(&url).await {
            tracing::warn!(
                "Background refresh of {} failed: {}",
                redact_password(&url),
                redact_password(&e.to_string())
            );
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncResponse {
            url: payload.url,
            status: "refreshing",
            channels: None,
        }),
    ))
}

/// GET /api/playlists/status?url= - Sync state of one playlist
pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, IngestError> {
    Ok(Json(state.engine.status(&query.url).await?))
}

/// GET /api/playlists/channels?url= - Channels of one playlist in source order
pub async fn channels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, IngestError> {
    Ok(Json(state.engine.channels(&query.url).await?))
}

/// PATCH /api/playlists?url= - Rename or change the user agent
pub async fn update_playlist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
    Json(payload): Json<UpdatePlaylistRequest>,
) -> Result<impl IntoResponse, IngestError> {
    if payload.title.is_none() && payload.user_agent.is_none() {
        return Err(IngestError::InvalidInput(
            "nothing to update: expected title or userAgent".to_string(),
        ));
    }

    let mut playlist = None;
    if let Some(title) = &payload.title {
        playlist = Some(state.engine.rename_playlist(&query.url, title).await?);
    }
    if let Some(user_agent) = &payload.user_agent {
        playlist = Some(
            state
                .engine
                .set_user_agent(&query.url, Some(user_agent))
                .await?,
        );
    }

    Ok(Json(playlist))
}

/// DELETE /api/playlists?url= - Unsubscribe
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse, IngestError> {
    match state.engine.unsubscribe(&query.url).await? {
        Some(playlist) => Ok(Json(playlist)),
        None => Err(IngestError::NotFound(query.url)),
    }
}
