//! PostgreSQL store
//!
//! Implements [`Store`] on top of the repositories. Snapshot commits, backup
//! imports and EPG replacement each run in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::repository::channels::FlagColumn;
use super::repository::{categories, channels, playlists, programmes, staged_flags};
use super::store::{SnapshotCommit, Store};
use crate::error::StoreError;
use crate::services::xtream::redact_password;
use crate::models::{
    CategoryFlag, CategoryFlagRecord, CategoryFlags, ChannelFlag, ChannelFlagRecord, ChannelFlags,
    ChannelRecord, ImportSummary, PlaylistBackup, PlaylistRecord, ProgrammeRecord,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn playlists(&self) -> Result<Vec<PlaylistRecord>, StoreError> {
        let rows = playlists::list_all(&self.pool).await?;
        let mut links = playlists::all_epg_links(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let epg_urls = links.remove(&row.url).unwrap_or_default();
                row.into_record(epg_urls)
            })
            .collect()
    }

    async fn playlist(&self, url: &str) -> Result<Option<PlaylistRecord>, StoreError> {
        let Some(row) = playlists::find(&self.pool, url).await? else {
            return Ok(None);
        };
        let epg_urls = playlists::epg_links(&self.pool, url).await?;
        row.into_record(epg_urls).map(Some)
    }

    async fn insert_playlist(&self, playlist: &PlaylistRecord) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !playlists::insert(&mut *tx, playlist).await? {
            return Ok(false);
        }
        playlists::replace_epg_links(&mut tx, &playlist.url, &playlist.epg_urls).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_playlist(&self, playlist: &PlaylistRecord) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !playlists::update_metadata(&mut *tx, playlist).await? {
            return Ok(false);
        }
        playlists::replace_epg_links(&mut tx, &playlist.url, &playlist.epg_urls).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_playlist(&self, url: &str) -> Result<Option<PlaylistRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let epg_urls = playlists::epg_links(&mut *tx, url).await?;
        let Some(row) = playlists::delete(&mut *tx, url).await? else {
            return Ok(None);
        };
        tx.commit().await?;
        row.into_record(epg_urls).map(Some)
    }

    async fn channels(&self, playlist_url: &str) -> Result<Vec<ChannelRecord>, StoreError> {
        let rows = channels::list(&self.pool, playlist_url).await?;
        Ok(rows.into_iter().map(ChannelRecord::from).collect())
    }

    async fn channel(
        &self,
        playlist_url: &str,
        id: &str,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(channels::find(&self.pool, playlist_url, id)
            .await?
            .map(ChannelRecord::from))
    }

    async fn toggle_channel_flag(
        &self,
        playlist_url: &str,
        id: &str,
        flag: ChannelFlag,
    ) -> Result<Option<ChannelFlags>, StoreError> {
        let column = match flag {
            ChannelFlag::Favorite => FlagColumn::Favorite,
            ChannelFlag::Muted => FlagColumn::Muted,
        };
        Ok(channels::toggle_flag(&self.pool, playlist_url, id, column)
            .await?
            .map(|(favorite, muted)| ChannelFlags { favorite, muted }))
    }

    async fn staged_flags(
        &self,
        playlist_url: &str,
    ) -> Result<HashMap<String, ChannelFlags>, StoreError> {
        let rows = staged_flags::list(&self.pool, playlist_url).await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.channel_id.clone(), row.flags()))
            .collect())
    }

    async fn all_channel_flags(&self) -> Result<Vec<ChannelFlagRecord>, StoreError> {
        let mut records: Vec<ChannelFlagRecord> = channels::flagged(&self.pool)
            .await?
            .into_iter()
            .map(ChannelFlagRecord::from)
            .collect();
        records.extend(
            staged_flags::flagged(&self.pool)
                .await?
                .into_iter()
                .map(ChannelFlagRecord::from),
        );
        Ok(records)
    }

    async fn category_flags(
        &self,
        playlist_url: &str,
    ) -> Result<BTreeMap<String, CategoryFlags>, StoreError> {
        let rows = categories::list(&self.pool, playlist_url).await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.category.clone(), row.flags()))
            .collect())
    }

    async fn all_category_flags(&self) -> Result<Vec<CategoryFlagRecord>, StoreError> {
        Ok(categories::list_all(&self.pool)
            .await?
            .into_iter()
            .map(CategoryFlagRecord::from)
            .collect())
    }

    async fn has_category(&self, playlist_url: &str, category: &str) -> Result<bool, StoreError> {
        Ok(channels::has_category(&self.pool, playlist_url, category).await?)
    }

    async fn toggle_category_flag(
        &self,
        playlist_url: &str,
        category: &str,
        flag: CategoryFlag,
    ) -> Result<CategoryFlags, StoreError> {
        let pinned = matches!(flag, CategoryFlag::Pinned);
        let row = categories::toggle(&self.pool, playlist_url, category, pinned).await?;
        Ok(row.flags())
    }

    async fn commit_snapshot(&self, commit: &SnapshotCommit) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes against a concurrent unsubscribe
        if playlists::find_for_update(&mut tx, &commit.playlist_url)
            .await?
            .is_none()
        {
            return Ok(false);
        }

        let keep: Vec<String> = commit.channels.iter().map(|c| c.id.clone()).collect();
        let removed = channels::delete_missing(&mut tx, &commit.playlist_url, &keep).await?;
        let written = channels::upsert_all(&mut tx, &commit.playlist_url, &commit.channels).await?;
        categories::ensure_defaults(&mut *tx, &commit.playlist_url, &commit.categories).await?;
        if !commit.consumed_staged.is_empty() {
            staged_flags::clear(&mut *tx, &commit.playlist_url, &commit.consumed_staged).await?;
        }
        playlists::touch_synced(&mut *tx, &commit.playlist_url, commit.synced_at).await?;

        tx.commit().await?;
        debug!(
            "Committed {} channels ({} removed) for {}",
            written,
            removed,
            redact_password(&commit.playlist_url)
        );
        Ok(true)
    }

    async fn import_backup(&self, blocks: &[PlaylistBackup]) -> Result<ImportSummary, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut summary = ImportSummary::default();

        for block in blocks {
            let record = block.to_record();
            if playlists::insert(&mut *tx, &record).await? {
                playlists::replace_epg_links(&mut tx, &record.url, &record.epg_urls).await?;
                summary.playlists_added += 1;
            } else {
                summary.playlists_skipped += 1;
            }

            for entry in &block.categories {
                let added = categories::insert_if_absent(
                    &mut *tx,
                    &block.url,
                    &entry.category,
                    entry.flags.pinned,
                    entry.flags.hidden,
                )
                .await?;
                if added {
                    summary.category_flags_added += 1;
                }
            }

            let present = channels::ids(&mut *tx, &block.url).await?;
            for entry in &block.channels {
                if entry.flags.is_default() || present.contains(&entry.id) {
                    continue;
                }
                let added = staged_flags::insert_if_absent(
                    &mut *tx,
                    &block.url,
                    &entry.id,
                    entry.flags.favorite,
                    entry.flags.muted,
                )
                .await?;
                if added {
                    summary.channel_flags_added += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn programmes(&self, epg_url: &str) -> Result<Vec<ProgrammeRecord>, StoreError> {
        Ok(programmes::list(&self.pool, epg_url)
            .await?
            .into_iter()
            .map(ProgrammeRecord::from)
            .collect())
    }

    async fn programmes_for(
        &self,
        epg_urls: &[String],
        channel_id: &str,
    ) -> Result<Vec<ProgrammeRecord>, StoreError> {
        Ok(programmes::for_channel(&self.pool, epg_urls, channel_id)
            .await?
            .into_iter()
            .map(ProgrammeRecord::from)
            .collect())
    }

    async fn latest_programme_end(
        &self,
        epg_url: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(programmes::latest_end(&self.pool, epg_url).await?)
    }

    async fn replace_programmes(
        &self,
        epg_url: &str,
        records: &[ProgrammeRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        programmes::delete_by_epg(&mut *tx, epg_url).await?;
        programmes::insert_all(&mut tx, epg_url, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_epg(&self, epg_url: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        programmes::delete_by_epg(&mut *tx, epg_url).await?;
        playlists::delete_epg_links(&mut *tx, epg_url).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        super::pool::health_check(&self.pool).await
    }
}
