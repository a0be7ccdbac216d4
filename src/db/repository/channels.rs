//! Channel repository with batched snapshot writes

use sqlx::postgres::PgExecutor;
use sqlx::{PgConnection, PgPool};

use crate::db::models::{ChannelColumns, ChannelFlagRow, ChannelRow};
use crate::models::ChannelRecord;

/// Rows per UNNEST insert
const BATCH_SIZE: usize = 500;

const CHANNEL_COLUMNS: &str = r#"
    playlist_url, id, name, logo, epg_id, category, url, license_type, license_key,
    last_seen, favorite, muted
"#;

/// Channels of a playlist in source order
pub async fn list(pool: &PgPool, playlist_url: &str) -> Result<Vec<ChannelRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {} FROM channels WHERE playlist_url = $1 ORDER BY position",
        CHANNEL_COLUMNS
    ))
    .bind(playlist_url)
    .fetch_all(pool)
    .await
}

pub async fn find(
    pool: &PgPool,
    playlist_url: &str,
    id: &str,
) -> Result<Option<ChannelRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {} FROM channels WHERE playlist_url = $1 AND id = $2",
        CHANNEL_COLUMNS
    ))
    .bind(playlist_url)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Ids currently stored for a playlist
pub async fn ids(
    executor: impl PgExecutor<'_>,
    playlist_url: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM channels WHERE playlist_url = $1")
        .bind(playlist_url)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Flip `favorite` (or `muted`) in place
pub async fn toggle_flag(
    pool: &PgPool,
    playlist_url: &str,
    id: &str,
    column: FlagColumn,
) -> Result<Option<(bool, bool)>, sqlx::Error> {
    let sql = match column {
        FlagColumn::Favorite => {
            "UPDATE channels SET favorite = NOT favorite WHERE playlist_url = $1 AND id = $2 \
             RETURNING favorite, muted"
        }
        FlagColumn::Muted => {
            "UPDATE channels SET muted = NOT muted WHERE playlist_url = $1 AND id = $2 \
             RETURNING favorite, muted"
        }
    };
    sqlx::query_as(sql)
        .bind(playlist_url)
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, Clone, Copy)]
pub enum FlagColumn {
    Favorite,
    Muted,
}

/// Channels with at least one flag set
pub async fn flagged(pool: &PgPool) -> Result<Vec<ChannelFlagRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelFlagRow>(
        r#"
        SELECT playlist_url, id AS channel_id, favorite, muted
        FROM channels
        WHERE favorite OR muted
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn has_category(
    pool: &PgPool,
    playlist_url: &str,
    category: &str,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM channels WHERE playlist_url = $1 AND category = $2)",
    )
    .bind(playlist_url)
    .bind(category)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Remove channels of a playlist whose id is not in `keep`
pub async fn delete_missing(
    conn: &mut PgConnection,
    playlist_url: &str,
    keep: &[String],
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM channels WHERE playlist_url = $1 AND NOT (id = ANY($2))")
            .bind(playlist_url)
            .bind(keep)
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}

/// Upsert the full channel set in batches
///
/// Existing rows keep their stored `favorite`/`muted`; only new rows take the
/// flags carried by the record.
pub async fn upsert_all(
    conn: &mut PgConnection,
    playlist_url: &str,
    channels: &[ChannelRecord],
) -> Result<usize, sqlx::Error> {
    for (index, batch) in channels.chunks(BATCH_SIZE).enumerate() {
        let cols = ChannelColumns::from_channels(batch, index * BATCH_SIZE);
        sqlx::query(
            r#"
            INSERT INTO channels (playlist_url, id, position, name, logo, epg_id, category, url,
                                  license_type, license_key, last_seen, favorite, muted)
            SELECT $1, * FROM UNNEST($2::text[], $3::int4[], $4::text[], $5::text[], $6::text[],
                                     $7::text[], $8::text[], $9::text[], $10::text[],
                                     $11::timestamptz[], $12::bool[], $13::bool[])
            ON CONFLICT (playlist_url, id) DO UPDATE SET
                position = EXCLUDED.position,
                name = EXCLUDED.name,
                logo = EXCLUDED.logo,
                epg_id = EXCLUDED.epg_id,
                category = EXCLUDED.category,
                url = EXCLUDED.url,
                license_type = EXCLUDED.license_type,
                license_key = EXCLUDED.license_key,
                last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(playlist_url)
        .bind(&cols.ids)
        .bind(&cols.positions)
        .bind(&cols.names)
        .bind(&cols.logos)
        .bind(&cols.epg_ids)
        .bind(&cols.categories)
        .bind(&cols.urls)
        .bind(&cols.license_types)
        .bind(&cols.license_keys)
        .bind(&cols.last_seen)
        .bind(&cols.favorites)
        .bind(&cols.muted)
        .execute(&mut *conn)
        .await?;
    }

    Ok(channels.len())
}
