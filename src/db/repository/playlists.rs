//! Playlist repository for database operations

use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

use crate::db::models::PlaylistRow;
use crate::models::PlaylistRecord;

const PLAYLIST_COLUMNS: &str = r#"
    url, title, kind, xtream_server, xtream_username, xtream_password,
    user_agent, last_synced_at
"#;

/// All playlists ordered by URL
pub async fn list_all(pool: &PgPool) -> Result<Vec<PlaylistRow>, sqlx::Error> {
    sqlx::query_as::<_, PlaylistRow>(&format!(
        "SELECT {} FROM playlists ORDER BY url",
        PLAYLIST_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Find playlist by URL
pub async fn find(
    executor: impl PgExecutor<'_>,
    url: &str,
) -> Result<Option<PlaylistRow>, sqlx::Error> {
    sqlx::query_as::<_, PlaylistRow>(&format!(
        "SELECT {} FROM playlists WHERE url = $1",
        PLAYLIST_COLUMNS
    ))
    .bind(url)
    .fetch_optional(executor)
    .await
}

/// Find playlist by URL and lock it for the rest of the transaction
pub async fn find_for_update(
    conn: &mut PgConnection,
    url: &str,
) -> Result<Option<PlaylistRow>, sqlx::Error> {
    sqlx::query_as::<_, PlaylistRow>(&format!(
        "SELECT {} FROM playlists WHERE url = $1 FOR UPDATE",
        PLAYLIST_COLUMNS
    ))
    .bind(url)
    .fetch_optional(conn)
    .await
}

/// Insert a playlist unless the URL exists; returns whether a row was added
pub async fn insert(
    executor: impl PgExecutor<'_>,
    playlist: &PlaylistRecord,
) -> Result<bool, sqlx::Error> {
    let creds = playlist.credentials.as_ref();
    let result = sqlx::query(
        r#"
        INSERT INTO playlists (url, title, kind, xtream_server, xtream_username, xtream_password,
                               user_agent, last_synced_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (url) DO NOTHING
        "#,
    )
    .bind(&playlist.url)
    .bind(&playlist.title)
    .bind(playlist.kind.as_str())
    .bind(creds.map(|c| c.server.as_str()))
    .bind(creds.map(|c| c.username.as_str()))
    .bind(creds.map(|c| c.password.as_str()))
    .bind(&playlist.user_agent)
    .bind(playlist.last_synced_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Update user-editable metadata
pub async fn update_metadata(
    executor: impl PgExecutor<'_>,
    playlist: &PlaylistRecord,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE playlists SET title = $2, user_agent = $3 WHERE url = $1")
        .bind(&playlist.url)
        .bind(&playlist.title)
        .bind(&playlist.user_agent)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a successful sync
pub async fn touch_synced(
    executor: impl PgExecutor<'_>,
    url: &str,
    synced_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE playlists SET last_synced_at = $2 WHERE url = $1")
        .bind(url)
        .bind(synced_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// Delete playlist and all related data (CASCADE)
pub async fn delete(
    executor: impl PgExecutor<'_>,
    url: &str,
) -> Result<Option<PlaylistRow>, sqlx::Error> {
    sqlx::query_as::<_, PlaylistRow>(&format!(
        "DELETE FROM playlists WHERE url = $1 RETURNING {}",
        PLAYLIST_COLUMNS
    ))
    .bind(url)
    .fetch_optional(executor)
    .await
}

// ============================================================================
// EPG links
// ============================================================================

/// EPG URLs linked to one playlist, sorted
pub async fn epg_links(
    executor: impl PgExecutor<'_>,
    playlist_url: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT epg_url FROM playlist_epg_links WHERE playlist_url = $1 ORDER BY epg_url",
    )
    .bind(playlist_url)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(u,)| u).collect())
}

/// All EPG links keyed by playlist URL
pub async fn all_epg_links(pool: &PgPool) -> Result<HashMap<String, Vec<String>>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT playlist_url, epg_url FROM playlist_epg_links ORDER BY playlist_url, epg_url",
    )
    .fetch_all(pool)
    .await?;

    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    for (playlist_url, epg_url) in rows {
        links.entry(playlist_url).or_default().push(epg_url);
    }
    Ok(links)
}

/// Make the stored links of a playlist equal to `epg_urls`
pub async fn replace_epg_links(
    conn: &mut PgConnection,
    playlist_url: &str,
    epg_urls: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM playlist_epg_links WHERE playlist_url = $1 AND NOT (epg_url = ANY($2))")
        .bind(playlist_url)
        .bind(epg_urls)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO playlist_epg_links (playlist_url, epg_url)
        SELECT $1, UNNEST($2::text[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(playlist_url)
    .bind(epg_urls)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Remove an EPG source from every playlist
pub async fn delete_epg_links(
    executor: impl PgExecutor<'_>,
    epg_url: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM playlist_epg_links WHERE epg_url = $1")
        .bind(epg_url)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
