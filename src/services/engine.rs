//! Ingestion engine
//!
//! The public operation set: subscriptions, refreshes, user flags, EPG
//! sources and backup. Composes the sync coordinator, the EPG sync, the
//! category state store and the backup codec over one [`Store`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::db::Store;
use crate::error::IngestError;
use crate::models::{
    BackupDocument, CategoryFlags, ChannelFlag, ChannelFlags, ChannelRecord, Episode,
    ImportSummary, PlaylistRecord, ProgrammeRecord, SourceKind, SyncStatus,
};
use crate::services::backup;
use crate::services::category_state::CategoryStateStore;
use crate::services::clock::Clock;
use crate::services::epg_sync::EpgSync;
use crate::services::fetcher::Fetcher;
use crate::services::sync::{ProgressFn, SyncCoordinator};
use crate::services::xtream::{
    parse_series_info, redact_password, XtreamClient, XtreamCredentials,
};

pub struct Engine {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    sync: SyncCoordinator,
    epg: EpgSync,
    categories: CategoryStateStore,
    allow_file_sources: bool,
}

/// Trimmed absolute http(s) URL, or file URL when `allow_file` is set
fn validate_url(raw: &str, allow_file: bool) -> Result<String, IngestError> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| {
        IngestError::InvalidInput(format!("invalid URL {:?}: {}", redact_password(raw), e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        "file" if allow_file => Ok(raw.to_string()),
        "file" => Err(IngestError::InvalidInput(
            "file:// sources are disabled (set ALLOW_FILE_SOURCES=true)".to_string(),
        )),
        other => Err(IngestError::InvalidInput(format!(
            "unsupported URL scheme: {}",
            other
        ))),
    }
}

fn non_empty(value: &str, what: &str) -> Result<String, IngestError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IngestError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(value.to_string())
}

fn kind_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::XtreamLive => "Live",
        SourceKind::XtreamVod => "Movies",
        SourceKind::XtreamSeries => "Series",
        SourceKind::M3u => "M3U",
    }
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        epg_retention_hours: i64,
    ) -> Self {
        Self {
            sync: SyncCoordinator::new(store.clone(), fetcher.clone(), clock.clone()),
            epg: EpgSync::new(store.clone(), fetcher.clone(), clock, epg_retention_hours),
            categories: CategoryStateStore::new(store.clone()),
            store,
            fetcher,
            allow_file_sources: false,
        }
    }

    /// Accept `file://` playlist and EPG sources
    pub fn with_file_sources(mut self, allow: bool) -> Self {
        self.allow_file_sources = allow;
        self
    }

    fn source_url(&self, raw: &str) -> Result<String, IngestError> {
        validate_url(raw, self.allow_file_sources)
    }

    async fn require_playlist(&self, url: &str) -> Result<PlaylistRecord, IngestError> {
        self.store
            .playlist(url)
            .await?
            .ok_or_else(|| IngestError::NotFound(url.to_string()))
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe to an M3U playlist and run its first sync
    ///
    /// A subscription whose first sync fails is removed again.
    pub async fn subscribe_m3u(&self, title: &str, url: &str) -> Result<usize, IngestError> {
        let url = self.source_url(url)?;
        let title = match title.trim() {
            "" => url.clone(),
            t => t.to_string(),
        };

        let record = PlaylistRecord::new_m3u(&title, &url);
        if !self.store.insert_playlist(&record).await? {
            return Err(IngestError::Conflict(url));
        }
        info!("Subscribed to M3U playlist {}", redact_password(&url));

        self.first_sync(&[url]).await
    }

    /// Subscribe to an Xtream panel
    ///
    /// Without `kind`, live, VOD and series are subscribed as three playlists
    /// and the kinds already subscribed are skipped. Live subscriptions get
    /// the panel's XMLTV endpoint linked as EPG source.
    pub async fn subscribe_xtream(
        &self,
        title: &str,
        server: &str,
        username: &str,
        password: &str,
        kind: Option<SourceKind>,
    ) -> Result<usize, IngestError> {
        let server = validate_url(server, false)?;
        let username = non_empty(username, "username")?;
        if password.is_empty() {
            return Err(IngestError::InvalidInput("password must not be empty".to_string()));
        }
        let kinds: Vec<SourceKind> = match kind {
            Some(SourceKind::M3u) => {
                return Err(IngestError::InvalidInput(
                    "m3u is not an Xtream kind".to_string(),
                ))
            }
            Some(kind) => vec![kind],
            None => SourceKind::XTREAM.to_vec(),
        };
        let creds = XtreamCredentials::new(&server, &username, password);
        let title = match title.trim() {
            "" => server.clone(),
            t => t.to_string(),
        };

        let mut inserted = Vec::new();
        for kind in &kinds {
            let label = if kinds.len() > 1 {
                format!("{} ({})", title, kind_label(*kind))
            } else {
                title.clone()
            };
            let mut record = PlaylistRecord::new_xtream(&label, creds.clone(), *kind);
            if *kind == SourceKind::XtreamLive {
                record.link_epg(&creds.epg_url());
            }
            if self.store.insert_playlist(&record).await? {
                inserted.push(record.url);
            }
        }

        if inserted.is_empty() {
            return Err(IngestError::Conflict(creds.playlist_url(kinds[0])));
        }
        info!(
            "Subscribed to {} Xtream playlist(s) on {}",
            inserted.len(),
            creds.server
        );

        self.first_sync(&inserted).await
    }

    /// Sync freshly inserted playlists; all of them are removed if one fails
    async fn first_sync(&self, urls: &[String]) -> Result<usize, IngestError> {
        let mut total = 0;
        for url in urls {
            match self.sync.sync(url, None).await {
                Ok(count) => total += count,
                Err(e) => {
                    warn!(
                        "First sync of {} failed, rolling back: {}",
                        redact_password(url),
                        redact_password(&e.to_string())
                    );
                    for url in urls {
                        self.sync.cancel(url);
                        if let Err(delete_err) = self.store.delete_playlist(url).await {
                            error!(
                                "Rollback of {} failed: {}",
                                redact_password(url),
                                delete_err
                            );
                        }
                        self.sync.forget(url);
                    }
                    return Err(e);
                }
            }
        }
        Ok(total)
    }

    /// Refresh one playlist; returns the committed channel count
    pub async fn refresh(&self, playlist_url: &str) -> Result<usize, IngestError> {
        self.sync.sync(playlist_url, None).await
    }

    /// Refresh one playlist, reporting the running merge count
    pub async fn refresh_with_progress(
        &self,
        playlist_url: &str,
        progress: ProgressFn,
    ) -> Result<usize, IngestError> {
        self.sync.sync(playlist_url, Some(progress)).await
    }

    /// Cancel a running refresh; `false` when none runs
    pub fn cancel_refresh(&self, playlist_url: &str) -> bool {
        self.sync.cancel(playlist_url)
    }

    /// Remove a playlist with everything attached to it
    pub async fn unsubscribe(
        &self,
        playlist_url: &str,
    ) -> Result<Option<PlaylistRecord>, IngestError> {
        self.sync.cancel(playlist_url);
        let removed = self.store.delete_playlist(playlist_url).await?;
        self.sync.forget(playlist_url);
        if removed.is_some() {
            info!("Unsubscribed from {}", redact_password(playlist_url));
        }
        Ok(removed)
    }

    // ========================================================================
    // Playlist metadata
    // ========================================================================

    pub async fn list_playlists(&self) -> Result<Vec<PlaylistRecord>, IngestError> {
        let mut playlists = self.store.playlists().await?;
        for playlist in &mut playlists {
            playlist.refreshing = self.sync.is_refreshing(&playlist.url);
        }
        Ok(playlists)
    }

    pub async fn status(&self, playlist_url: &str) -> Result<SyncStatus, IngestError> {
        let playlist = self.require_playlist(playlist_url).await?;
        Ok(self.sync.status(playlist_url, playlist.last_synced_at))
    }

    pub async fn rename_playlist(
        &self,
        playlist_url: &str,
        title: &str,
    ) -> Result<PlaylistRecord, IngestError> {
        let mut playlist = self.require_playlist(playlist_url).await?;
        playlist.title = non_empty(title, "title")?;
        self.save_playlist(playlist).await
    }

    /// Set or clear (`None` or blank) the custom user agent
    pub async fn set_user_agent(
        &self,
        playlist_url: &str,
        user_agent: Option<&str>,
    ) -> Result<PlaylistRecord, IngestError> {
        let mut playlist = self.require_playlist(playlist_url).await?;
        playlist.user_agent = user_agent
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .map(str::to_string);
        self.save_playlist(playlist).await
    }

    async fn save_playlist(&self, playlist: PlaylistRecord) -> Result<PlaylistRecord, IngestError> {
        if !self.store.update_playlist(&playlist).await? {
            return Err(IngestError::NotFound(playlist.url));
        }
        Ok(playlist)
    }

    // ========================================================================
    // Channels and categories
    // ========================================================================

    pub async fn channels(&self, playlist_url: &str) -> Result<Vec<ChannelRecord>, IngestError> {
        self.require_playlist(playlist_url).await?;
        Ok(self.store.channels(playlist_url).await?)
    }

    pub async fn favorite_or_unfavorite_channel(
        &self,
        playlist_url: &str,
        channel_id: &str,
    ) -> Result<ChannelFlags, IngestError> {
        self.toggle_channel(playlist_url, channel_id, ChannelFlag::Favorite)
            .await
    }

    pub async fn mute_or_unmute_channel(
        &self,
        playlist_url: &str,
        channel_id: &str,
    ) -> Result<ChannelFlags, IngestError> {
        self.toggle_channel(playlist_url, channel_id, ChannelFlag::Muted)
            .await
    }

    async fn toggle_channel(
        &self,
        playlist_url: &str,
        channel_id: &str,
        flag: ChannelFlag,
    ) -> Result<ChannelFlags, IngestError> {
        self.store
            .toggle_channel_flag(playlist_url, channel_id, flag)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("{} channel {}", playlist_url, channel_id)))
    }

    pub async fn pin_or_unpin_category(
        &self,
        playlist_url: &str,
        category: &str,
    ) -> Result<Option<CategoryFlags>, IngestError> {
        self.categories.pin_or_unpin(playlist_url, category).await
    }

    pub async fn hide_or_unhide_category(
        &self,
        playlist_url: &str,
        category: &str,
    ) -> Result<Option<CategoryFlags>, IngestError> {
        self.categories.hide_or_unhide(playlist_url, category).await
    }

    pub async fn category_flags(
        &self,
        playlist_url: &str,
    ) -> Result<BTreeMap<String, CategoryFlags>, IngestError> {
        self.categories.flags(playlist_url).await
    }

    /// Episodes of one series channel, fetched from the panel on demand
    pub async fn read_episodes(
        &self,
        playlist_url: &str,
        series_channel_id: &str,
    ) -> Result<Vec<Episode>, IngestError> {
        let playlist = self.require_playlist(playlist_url).await?;
        let creds = match (&playlist.kind, &playlist.credentials) {
            (SourceKind::XtreamSeries, Some(creds)) => creds,
            _ => {
                return Err(IngestError::InvalidInput(format!(
                    "{} is not an Xtream series playlist",
                    playlist_url
                )))
            }
        };
        let channel = self
            .store
            .channel(playlist_url, series_channel_id)
            .await?
            .ok_or_else(|| {
                IngestError::NotFound(format!("{} channel {}", playlist_url, series_channel_id))
            })?;

        // Disambiguated ids carry a `#hash` suffix the panel does not know
        let series_id = channel.id.split('#').next().unwrap_or(&channel.id);
        let client = XtreamClient::new(
            self.fetcher.as_ref(),
            creds,
            playlist.user_agent.as_deref(),
        );
        let bytes = client.get_series_info(series_id).await?;
        Ok(parse_series_info(creds, series_id, &bytes)?)
    }

    // ========================================================================
    // EPG
    // ========================================================================

    /// Refresh one EPG source; returns its stored programme count
    pub async fn fetch_epg(&self, epg_url: &str, force: bool) -> Result<usize, IngestError> {
        let epg_url = self.source_url(epg_url)?;
        self.epg.fetch(&epg_url, force).await
    }

    pub fn epg_status(&self, epg_url: &str) -> SyncStatus {
        self.epg.status(epg_url)
    }

    /// Associate an EPG source with a playlist; `false` when already linked
    pub async fn link_epg(&self, epg_url: &str, playlist_url: &str) -> Result<bool, IngestError> {
        let epg_url = self.source_url(epg_url)?;
        let mut playlist = self.require_playlist(playlist_url).await?;
        if !playlist.link_epg(&epg_url) {
            return Ok(false);
        }
        self.save_playlist(playlist).await?;
        Ok(true)
    }

    /// `false` when the source was not linked
    pub async fn unlink_epg(&self, epg_url: &str, playlist_url: &str) -> Result<bool, IngestError> {
        let mut playlist = self.require_playlist(playlist_url).await?;
        if !playlist.unlink_epg(epg_url.trim()) {
            return Ok(false);
        }
        self.save_playlist(playlist).await?;
        Ok(true)
    }

    /// Drop an EPG source's programmes and every link to it
    pub async fn delete_epg(&self, epg_url: &str) -> Result<(), IngestError> {
        let epg_url = epg_url.trim();
        self.epg.cancel(epg_url);
        self.store.delete_epg(epg_url).await?;
        self.epg.forget(epg_url);
        Ok(())
    }

    /// Every EPG source linked to at least one playlist
    pub async fn epg_sources(&self) -> Result<BTreeSet<String>, IngestError> {
        Ok(self
            .store
            .playlists()
            .await?
            .into_iter()
            .flat_map(|p| p.epg_urls)
            .collect())
    }

    /// Programmes of one channel across the playlist's EPG sources
    pub async fn programmes_for(
        &self,
        playlist_url: &str,
        channel_id: &str,
    ) -> Result<Vec<ProgrammeRecord>, IngestError> {
        let playlist = self.require_playlist(playlist_url).await?;
        let guide_id = match self.store.channel(playlist_url, channel_id).await? {
            Some(channel) => channel.guide_id().to_string(),
            None => channel_id.to_string(),
        };
        if playlist.epg_urls.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .programmes_for(&playlist.epg_urls, &guide_id)
            .await?)
    }

    // ========================================================================
    // Backup
    // ========================================================================

    pub async fn export_backup(&self) -> Result<BackupDocument, IngestError> {
        let playlists = self.store.playlists().await?;
        let categories = self.store.all_category_flags().await?;
        let channels = self.store.all_channel_flags().await?;
        Ok(backup::export(&playlists, &categories, &channels))
    }

    /// Merge a backup into the local state
    ///
    /// Additive: subscribed playlists and flag records already present locally
    /// are kept as they are. Restored playlists are not synced here.
    pub async fn import_backup(
        &self,
        document: &BackupDocument,
    ) -> Result<ImportSummary, IngestError> {
        backup::validate(document)?;
        for block in &document.playlists {
            self.source_url(&block.url)?;
            for epg_url in &block.epg_urls {
                self.source_url(epg_url)?;
            }
        }
        let summary = self.store.import_backup(&document.playlists).await?;
        info!(
            "Backup imported: {} playlists added, {} skipped",
            summary.playlists_added, summary.playlists_skipped
        );
        Ok(summary)
    }

    pub async fn is_healthy(&self) -> bool {
        self.store.health_check().await
    }
}
