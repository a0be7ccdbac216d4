//! Staged channel flags: restored from a backup, waiting for their channel

use sqlx::postgres::PgExecutor;
use sqlx::PgPool;

use crate::db::models::ChannelFlagRow;

pub async fn list(pool: &PgPool, playlist_url: &str) -> Result<Vec<ChannelFlagRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelFlagRow>(
        r#"
        SELECT playlist_url, channel_id, favorite, muted
        FROM staged_channel_flags
        WHERE playlist_url = $1
        "#,
    )
    .bind(playlist_url)
    .fetch_all(pool)
    .await
}

pub async fn flagged(pool: &PgPool) -> Result<Vec<ChannelFlagRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelFlagRow>(
        r#"
        SELECT playlist_url, channel_id, favorite, muted
        FROM staged_channel_flags
        WHERE favorite OR muted
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Drop entries that a sync has applied
pub async fn clear(
    executor: impl PgExecutor<'_>,
    playlist_url: &str,
    channel_ids: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM staged_channel_flags WHERE playlist_url = $1 AND channel_id = ANY($2)",
    )
    .bind(playlist_url)
    .bind(channel_ids)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_if_absent(
    executor: impl PgExecutor<'_>,
    playlist_url: &str,
    channel_id: &str,
    favorite: bool,
    muted: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO staged_channel_flags (playlist_url, channel_id, favorite, muted)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(playlist_url)
    .bind(channel_id)
    .bind(favorite)
    .bind(muted)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
