//! Category flag repository

use sqlx::postgres::PgExecutor;
use sqlx::PgPool;

use crate::db::models::CategoryFlagRow;

pub async fn list(pool: &PgPool, playlist_url: &str) -> Result<Vec<CategoryFlagRow>, sqlx::Error> {
    sqlx::query_as::<_, CategoryFlagRow>(
        r#"
        SELECT playlist_url, category, pinned, hidden
        FROM category_flags
        WHERE playlist_url = $1
        ORDER BY category
        "#,
    )
    .bind(playlist_url)
    .fetch_all(pool)
    .await
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<CategoryFlagRow>, sqlx::Error> {
    sqlx::query_as::<_, CategoryFlagRow>(
        "SELECT playlist_url, category, pinned, hidden FROM category_flags",
    )
    .fetch_all(pool)
    .await
}

/// Flip `pinned` (or `hidden`); a missing record starts from defaults
pub async fn toggle(
    pool: &PgPool,
    playlist_url: &str,
    category: &str,
    pinned: bool,
) -> Result<CategoryFlagRow, sqlx::Error> {
    let sql = if pinned {
        r#"
        INSERT INTO category_flags (playlist_url, category, pinned, hidden)
        VALUES ($1, $2, TRUE, FALSE)
        ON CONFLICT (playlist_url, category) DO UPDATE SET pinned = NOT category_flags.pinned
        RETURNING playlist_url, category, pinned, hidden
        "#
    } else {
        r#"
        INSERT INTO category_flags (playlist_url, category, pinned, hidden)
        VALUES ($1, $2, FALSE, TRUE)
        ON CONFLICT (playlist_url, category) DO UPDATE SET hidden = NOT category_flags.hidden
        RETURNING playlist_url, category, pinned, hidden
        "#
    };
    sqlx::query_as::<_, CategoryFlagRow>(sql)
        .bind(playlist_url)
        .bind(category)
        .fetch_one(pool)
        .await
}

/// Create default records for categories that have none
pub async fn ensure_defaults(
    executor: impl PgExecutor<'_>,
    playlist_url: &str,
    categories: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO category_flags (playlist_url, category)
        SELECT $1, UNNEST($2::text[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(playlist_url)
    .bind(categories)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a record only when none exists
pub async fn insert_if_absent(
    executor: impl PgExecutor<'_>,
    playlist_url: &str,
    category: &str,
    pinned: bool,
    hidden: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO category_flags (playlist_url, category, pinned, hidden)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(playlist_url)
    .bind(category)
    .bind(pinned)
    .bind(hidden)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
