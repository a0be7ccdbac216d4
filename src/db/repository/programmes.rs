//! Programme (EPG) repository

use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::{PgConnection, PgPool};

use crate::db::models::ProgrammeRow;
use crate::models::ProgrammeRecord;

/// Rows per UNNEST insert
const BATCH_SIZE: usize = 1000;

pub async fn list(pool: &PgPool, epg_url: &str) -> Result<Vec<ProgrammeRow>, sqlx::Error> {
    sqlx::query_as::<_, ProgrammeRow>(
        r#"
        SELECT epg_url, channel_id, start_at, end_at, title, description, icon
        FROM programmes
        WHERE epg_url = $1
        ORDER BY channel_id, start_at
        "#,
    )
    .bind(epg_url)
    .fetch_all(pool)
    .await
}

/// Programmes of one guide channel across several sources
pub async fn for_channel(
    pool: &PgPool,
    epg_urls: &[String],
    channel_id: &str,
) -> Result<Vec<ProgrammeRow>, sqlx::Error> {
    sqlx::query_as::<_, ProgrammeRow>(
        r#"
        SELECT epg_url, channel_id, start_at, end_at, title, description, icon
        FROM programmes
        WHERE epg_url = ANY($1) AND channel_id = $2
        ORDER BY start_at, epg_url
        "#,
    )
    .bind(epg_urls)
    .bind(channel_id)
    .fetch_all(pool)
    .await
}

pub async fn latest_end(
    pool: &PgPool,
    epg_url: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: (Option<DateTime<Utc>>,) =
        sqlx::query_as("SELECT MAX(end_at) FROM programmes WHERE epg_url = $1")
            .bind(epg_url)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn delete_by_epg(
    executor: impl PgExecutor<'_>,
    epg_url: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM programmes WHERE epg_url = $1")
        .bind(epg_url)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Insert programmes in batches; callers delete the previous snapshot first
pub async fn insert_all(
    conn: &mut PgConnection,
    epg_url: &str,
    programmes: &[ProgrammeRecord],
) -> Result<usize, sqlx::Error> {
    for batch in programmes.chunks(BATCH_SIZE) {
        let channel_ids: Vec<&str> = batch.iter().map(|p| p.channel_id.as_str()).collect();
        let starts: Vec<DateTime<Utc>> = batch.iter().map(|p| p.start).collect();
        let ends: Vec<DateTime<Utc>> = batch.iter().map(|p| p.end).collect();
        let titles: Vec<&str> = batch.iter().map(|p| p.title.as_str()).collect();
        let descriptions: Vec<Option<&str>> =
            batch.iter().map(|p| p.description.as_deref()).collect();
        let icons: Vec<Option<&str>> = batch.iter().map(|p| p.icon.as_deref()).collect();

        sqlx::query(
            r#"
            INSERT INTO programmes (epg_url, channel_id, start_at, end_at, title, description, icon)
            SELECT $1, * FROM UNNEST($2::text[], $3::timestamptz[], $4::timestamptz[],
                                     $5::text[], $6::text[], $7::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(epg_url)
        .bind(&channel_ids)
        .bind(&starts)
        .bind(&ends)
        .bind(&titles)
        .bind(&descriptions)
        .bind(&icons)
        .execute(&mut *conn)
        .await?;
    }

    Ok(programmes.len())
}
