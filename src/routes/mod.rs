//! HTTP surface

pub mod backup;
pub mod categories;
pub mod channels;
pub mod epg;
pub mod health;
pub mod playlists;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;

/// Build the application router (middleware is layered by the caller)
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ready", get(health::ready))
        .route("/live", get(health::live))
        // Playlist endpoints
        .route(
            "/api/playlists",
            get(playlists::list_playlists)
                .delete(playlists::unsubscribe)
                .patch(playlists::update_playlist),
        )
        .route("/api/playlists/m3u", post(playlists::subscribe_m3u))
        .route("/api/playlists/xtream", post(playlists::subscribe_xtream))
        .route("/api/playlists/refresh", post(playlists::refresh))
        .route("/api/playlists/status", get(playlists::status))
        .route("/api/playlists/channels", get(playlists::channels))
        // Category endpoints
        .route("/api/categories", get(categories::list))
        .route("/api/categories/pin", post(categories::pin))
        .route("/api/categories/hide", post(categories::hide))
        // Channel endpoints
        .route("/api/channels/favorite", post(channels::favorite))
        .route("/api/channels/mute", post(channels::mute))
        .route("/api/channels/episodes", get(channels::episodes))
        // Backup endpoints
        .route("/api/backup", get(backup::export).post(backup::import))
        // EPG endpoints
        .route("/api/epg", delete(epg::delete))
        .route("/api/epg/fetch", post(epg::fetch))
        .route("/api/epg/link", post(epg::link).delete(epg::unlink))
        .route("/api/epg/programmes", get(epg::programmes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::engine::tests::{harness, Harness, LIST, PLAYLIST};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Instant;
    use tower::ServiceExt;

    fn build_app(h: &Harness) -> Router {
        router(Arc::new(AppState {
            config: Config::from_env(),
            engine: h.engine.clone(),
            start_time: Instant::now(),
        }))
    }

    fn encoded(url: &str) -> String {
        urlencoding::encode(url).into_owned()
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_routes() {
        let h = harness();
        let app = build_app(&h);

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = send(&app, "GET", "/live", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_subscribe_and_toggle_flow() {
        let h = harness();
        h.fetcher.serve(LIST, PLAYLIST);
        let app = build_app(&h);

        let (status, body) = send(
            &app,
            "POST",
            "/api/playlists/m3u",
            Some(json!({ "title": "Home", "url": LIST })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["channels"], 3);

        let (status, _) = send(
            &app,
            "POST",
            "/api/playlists/m3u",
            Some(json!({ "title": "Home", "url": LIST })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = send(
            &app,
            "POST",
            "/api/channels/favorite",
            Some(json!({ "url": LIST, "channelId": "news.1" })),
        )
        .await;
        assert_eq!(body["favorite"], true);

        let (_, body) = send(
            &app,
            "POST",
            "/api/categories/pin",
            Some(json!({ "url": LIST, "category": "Nowhere" })),
        )
        .await;
        assert_eq!(body["changed"], false);

        let uri = format!("/api/playlists/channels?url={}", encoded(LIST));
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["favorite"], true);
    }

    #[tokio::test]
    async fn test_unknown_playlist_is_404() {
        let h = harness();
        let app = build_app(&h);

        let uri = format!("/api/playlists/status?url={}", encoded(LIST));
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(LIST));

        let (status, _) = send(
            &app,
            "POST",
            "/api/playlists/refresh",
            Some(json!({ "url": LIST, "background": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_backup_export_and_import() {
        let h = harness();
        h.fetcher.serve(LIST, PLAYLIST);
        h.engine.subscribe_m3u("Home", LIST).await.unwrap();
        let app = build_app(&h);

        let (status, document) = send(&app, "GET", "/api/backup", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(document["version"], 1);

        let other = harness();
        let (status, summary) = send(&build_app(&other), "POST", "/api/backup", Some(document)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["playlistsAdded"], 1);

        let (status, _) = send(
            &app,
            "POST",
            "/api/backup",
            Some(json!({ "version": 9, "playlists": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_bad_xtream_kind_is_400() {
        let h = harness();
        let app = build_app(&h);
        let (status, _) = send(
            &app,
            "POST",
            "/api/playlists/xtream",
            Some(json!({
                "server": "http://panel:8080",
                "username": "u",
                "password": "p",
                "kind": "radio"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_local_file_subscription_is_400() {
        let h = harness();
        let app = build_app(&h);
        let (status, body) = send(
            &app,
            "POST",
            "/api/playlists/m3u",
            Some(json!({ "title": "Passwords", "url": "file:///etc/passwd" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("ALLOW_FILE_SOURCES"));
        assert_eq!(h.fetcher.calls(), 0);
    }
}
