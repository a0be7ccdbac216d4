//! Store contract
//!
//! Everything the engine persists goes through [`Store`]. Implementations:
//! [`crate::db::pg_store::PgStore`] (PostgreSQL) and
//! [`crate::db::memory::MemoryStore`] (in process).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::error::StoreError;
use crate::models::{
    CategoryFlag, CategoryFlagRecord, CategoryFlags, ChannelFlag, ChannelFlagRecord, ChannelFlags,
    ChannelRecord, ImportSummary, PlaylistBackup, PlaylistRecord, ProgrammeRecord,
};

/// Result of one sync pass, written as a single unit
#[derive(Debug, Clone)]
pub struct SnapshotCommit {
    pub playlist_url: String,
    /// Full channel set in source order; stored channels not listed are deleted
    pub channels: Vec<ChannelRecord>,
    /// Categories of the new set; missing flag records are created with defaults
    pub categories: Vec<String>,
    /// Staged flag entries applied by this pass, cleared on commit
    pub consumed_staged: Vec<String>,
    pub synced_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------------
    // Playlists
    // ------------------------------------------------------------------------

    /// All playlists ordered by URL
    async fn playlists(&self) -> Result<Vec<PlaylistRecord>, StoreError>;

    async fn playlist(&self, url: &str) -> Result<Option<PlaylistRecord>, StoreError>;

    /// Insert a new playlist; `false` when the URL is already subscribed
    async fn insert_playlist(&self, playlist: &PlaylistRecord) -> Result<bool, StoreError>;

    /// Replace title, user agent and EPG links; `false` when unknown
    async fn update_playlist(&self, playlist: &PlaylistRecord) -> Result<bool, StoreError>;

    /// Remove a playlist with its channels, category flags and staged flags
    async fn delete_playlist(&self, url: &str) -> Result<Option<PlaylistRecord>, StoreError>;

    // ------------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------------

    /// Channels of a playlist in source order
    async fn channels(&self, playlist_url: &str) -> Result<Vec<ChannelRecord>, StoreError>;

    async fn channel(
        &self,
        playlist_url: &str,
        id: &str,
    ) -> Result<Option<ChannelRecord>, StoreError>;

    /// Flip one flag atomically; `None` when the channel does not exist
    async fn toggle_channel_flag(
        &self,
        playlist_url: &str,
        id: &str,
        flag: ChannelFlag,
    ) -> Result<Option<ChannelFlags>, StoreError>;

    /// Flags restored from a backup for channels not synced yet
    async fn staged_flags(
        &self,
        playlist_url: &str,
    ) -> Result<HashMap<String, ChannelFlags>, StoreError>;

    /// Every non-default channel flag, staged entries included
    async fn all_channel_flags(&self) -> Result<Vec<ChannelFlagRecord>, StoreError>;

    // ------------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------------

    async fn category_flags(
        &self,
        playlist_url: &str,
    ) -> Result<BTreeMap<String, CategoryFlags>, StoreError>;

    async fn all_category_flags(&self) -> Result<Vec<CategoryFlagRecord>, StoreError>;

    /// True when at least one channel of the playlist is in `category`
    async fn has_category(&self, playlist_url: &str, category: &str) -> Result<bool, StoreError>;

    /// Flip one flag atomically, creating the record when missing
    async fn toggle_category_flag(
        &self,
        playlist_url: &str,
        category: &str,
        flag: CategoryFlag,
    ) -> Result<CategoryFlags, StoreError>;

    // ------------------------------------------------------------------------
    // Sync and backup
    // ------------------------------------------------------------------------

    /// Apply a sync pass atomically
    ///
    /// Flags of channels that already exist stay as stored, so a toggle that
    /// lands while the pass runs is not lost. Returns `false` without writing
    /// when the playlist was removed in the meantime.
    async fn commit_snapshot(&self, commit: &SnapshotCommit) -> Result<bool, StoreError>;

    /// Add whatever the backup has that is missing locally, in one unit
    async fn import_backup(&self, blocks: &[PlaylistBackup]) -> Result<ImportSummary, StoreError>;

    // ------------------------------------------------------------------------
    // Programmes
    // ------------------------------------------------------------------------

    async fn programmes(&self, epg_url: &str) -> Result<Vec<ProgrammeRecord>, StoreError>;

    /// Programmes of one guide channel across the given sources, by start
    async fn programmes_for(
        &self,
        epg_urls: &[String],
        channel_id: &str,
    ) -> Result<Vec<ProgrammeRecord>, StoreError>;

    async fn latest_programme_end(
        &self,
        epg_url: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Replace the snapshot of one EPG source atomically
    async fn replace_programmes(
        &self,
        epg_url: &str,
        programmes: &[ProgrammeRecord],
    ) -> Result<(), StoreError>;

    /// Drop an EPG source's programmes and its playlist links
    async fn delete_epg(&self, epg_url: &str) -> Result<(), StoreError>;

    async fn health_check(&self) -> bool;
}
