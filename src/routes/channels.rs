use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::IngestError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest {
    pub url: String,
    pub channel_id: String,
}

/// POST /api/channels/favorite - Favorite or unfavorite a channel
pub async fn favorite(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChannelRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let flags = state
        .engine
        .favorite_or_unfavorite_channel(&payload.url, &payload.channel_id)
        .await?;
    Ok(Json(flags))
}

/// POST /api/channels/mute - Mute or unmute a channel
pub async fn mute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChannelRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let flags = state
        .engine
        .mute_or_unmute_channel(&payload.url, &payload.channel_id)
        .await?;
    Ok(Json(flags))
}

/// GET /api/channels/episodes?url=&channelId= - Episodes of a series channel
pub async fn episodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChannelRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let episodes = state
        .engine
        .read_episodes(&query.url, &query.channel_id)
        .await?;
    Ok(Json(episodes))
}
