//! In-process store
//!
//! All state sits behind one `RwLock`, so every write (a sync commit in
//! particular) is observed by readers either completely or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::store::{SnapshotCommit, Store};
use crate::error::StoreError;
use crate::models::{
    CategoryFlag, CategoryFlagRecord, CategoryFlags, ChannelFlag, ChannelFlagRecord, ChannelFlags,
    ChannelRecord, ImportSummary, PlaylistBackup, PlaylistRecord, ProgrammeRecord,
};

#[derive(Default)]
struct State {
    playlists: BTreeMap<String, PlaylistRecord>,
    /// playlist URL -> channels in source order
    channels: HashMap<String, Vec<ChannelRecord>>,
    /// playlist URL -> category -> flags
    category_flags: HashMap<String, BTreeMap<String, CategoryFlags>>,
    /// playlist URL -> channel id -> restored flags
    staged: HashMap<String, BTreeMap<String, ChannelFlags>>,
    /// EPG URL -> programmes sorted by (channel, start)
    programmes: HashMap<String, Vec<ProgrammeRecord>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn playlists(&self) -> Result<Vec<PlaylistRecord>, StoreError> {
        Ok(self.state.read().await.playlists.values().cloned().collect())
    }

    async fn playlist(&self, url: &str) -> Result<Option<PlaylistRecord>, StoreError> {
        Ok(self.state.read().await.playlists.get(url).cloned())
    }

    async fn insert_playlist(&self, playlist: &PlaylistRecord) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.playlists.contains_key(&playlist.url) {
            return Ok(false);
        }
        let mut record = playlist.clone();
        record.refreshing = false;
        state.playlists.insert(playlist.url.clone(), record);
        Ok(true)
    }

    async fn update_playlist(&self, playlist: &PlaylistRecord) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.playlists.get_mut(&playlist.url) {
            Some(existing) => {
                existing.title = playlist.title.clone();
                existing.user_agent = playlist.user_agent.clone();
                existing.epg_urls = playlist.epg_urls.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_playlist(&self, url: &str) -> Result<Option<PlaylistRecord>, StoreError> {
        let mut state = self.state.write().await;
        let removed = state.playlists.remove(url);
        if removed.is_some() {
            state.channels.remove(url);
            state.category_flags.remove(url);
            state.staged.remove(url);
        }
        Ok(removed)
    }

    async fn channels(&self, playlist_url: &str) -> Result<Vec<ChannelRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .channels
            .get(playlist_url)
            .cloned()
            .unwrap_or_default())
    }

    async fn channel(
        &self,
        playlist_url: &str,
        id: &str,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .channels
            .get(playlist_url)
            .and_then(|channels| channels.iter().find(|c| c.id == id).cloned()))
    }

    async fn toggle_channel_flag(
        &self,
        playlist_url: &str,
        id: &str,
        flag: ChannelFlag,
    ) -> Result<Option<ChannelFlags>, StoreError> {
        let mut state = self.state.write().await;
        let channel = state
            .channels
            .get_mut(playlist_url)
            .and_then(|channels| channels.iter_mut().find(|c| c.id == id));
        Ok(channel.map(|c| {
            c.flags.toggle(flag);
            c.flags
        }))
    }

    async fn staged_flags(
        &self,
        playlist_url: &str,
    ) -> Result<HashMap<String, ChannelFlags>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .staged
            .get(playlist_url)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }

    async fn all_channel_flags(&self) -> Result<Vec<ChannelFlagRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records = Vec::new();
        for (playlist_url, channels) in &state.channels {
            records.extend(channels.iter().filter(|c| !c.flags.is_default()).map(|c| {
                ChannelFlagRecord {
                    playlist_url: playlist_url.clone(),
                    channel_id: c.id.clone(),
                    flags: c.flags,
                }
            }));
        }
        for (playlist_url, staged) in &state.staged {
            records.extend(staged.iter().filter(|(_, f)| !f.is_default()).map(|(id, flags)| {
                ChannelFlagRecord {
                    playlist_url: playlist_url.clone(),
                    channel_id: id.clone(),
                    flags: *flags,
                }
            }));
        }
        Ok(records)
    }

    async fn category_flags(
        &self,
        playlist_url: &str,
    ) -> Result<BTreeMap<String, CategoryFlags>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .category_flags
            .get(playlist_url)
            .cloned()
            .unwrap_or_default())
    }

    async fn all_category_flags(&self) -> Result<Vec<CategoryFlagRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .category_flags
            .iter()
            .flat_map(|(playlist_url, flags)| {
                flags.iter().map(move |(category, flags)| CategoryFlagRecord {
                    playlist_url: playlist_url.clone(),
                    category: category.clone(),
                    flags: *flags,
                })
            })
            .collect())
    }

    async fn has_category(&self, playlist_url: &str, category: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .channels
            .get(playlist_url)
            .is_some_and(|channels| channels.iter().any(|c| c.category == category)))
    }

    async fn toggle_category_flag(
        &self,
        playlist_url: &str,
        category: &str,
        flag: CategoryFlag,
    ) -> Result<CategoryFlags, StoreError> {
        let mut state = self.state.write().await;
        let flags = state
            .category_flags
            .entry(playlist_url.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default();
        flags.toggle(flag);
        Ok(*flags)
    }

    async fn commit_snapshot(&self, commit: &SnapshotCommit) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let State {
            playlists,
            channels,
            category_flags,
            staged,
            ..
        } = &mut *state;

        let Some(playlist) = playlists.get_mut(&commit.playlist_url) else {
            return Ok(false);
        };
        playlist.last_synced_at = Some(commit.synced_at);

        let stored: HashMap<String, ChannelFlags> = channels
            .get(&commit.playlist_url)
            .map(|list| list.iter().map(|c| (c.id.clone(), c.flags)).collect())
            .unwrap_or_default();
        let merged = commit
            .channels
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if let Some(flags) = stored.get(&c.id) {
                    c.flags = *flags;
                }
                c
            })
            .collect();
        channels.insert(commit.playlist_url.clone(), merged);

        let flags = category_flags.entry(commit.playlist_url.clone()).or_default();
        for category in &commit.categories {
            flags.entry(category.clone()).or_default();
        }

        if let Some(pending) = staged.get_mut(&commit.playlist_url) {
            for id in &commit.consumed_staged {
                pending.remove(id);
            }
            if pending.is_empty() {
                staged.remove(&commit.playlist_url);
            }
        }

        Ok(true)
    }

    async fn import_backup(&self, blocks: &[PlaylistBackup]) -> Result<ImportSummary, StoreError> {
        let mut state = self.state.write().await;
        let mut summary = ImportSummary::default();

        for block in blocks {
            if state.playlists.contains_key(&block.url) {
                summary.playlists_skipped += 1;
            } else {
                state.playlists.insert(block.url.clone(), block.to_record());
                summary.playlists_added += 1;
            }

            let flags = state.category_flags.entry(block.url.clone()).or_default();
            for entry in &block.categories {
                if !flags.contains_key(&entry.category) {
                    flags.insert(entry.category.clone(), entry.flags);
                    summary.category_flags_added += 1;
                }
            }

            let present: Vec<String> = state
                .channels
                .get(&block.url)
                .map(|list| list.iter().map(|c| c.id.clone()).collect())
                .unwrap_or_default();
            let staged = state.staged.entry(block.url.clone()).or_default();
            for entry in &block.channels {
                if entry.flags.is_default()
                    || present.contains(&entry.id)
                    || staged.contains_key(&entry.id)
                {
                    continue;
                }
                staged.insert(entry.id.clone(), entry.flags);
                summary.channel_flags_added += 1;
            }
            if staged.is_empty() {
                state.staged.remove(&block.url);
            }
        }

        Ok(summary)
    }

    async fn programmes(&self, epg_url: &str) -> Result<Vec<ProgrammeRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .programmes
            .get(epg_url)
            .cloned()
            .unwrap_or_default())
    }

    async fn programmes_for(
        &self,
        epg_urls: &[String],
        channel_id: &str,
    ) -> Result<Vec<ProgrammeRecord>, StoreError> {
        let state = self.state.read().await;
        let mut found: Vec<ProgrammeRecord> = epg_urls
            .iter()
            .filter_map(|url| state.programmes.get(url))
            .flatten()
            .filter(|p| p.channel_id == channel_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.epg_url.cmp(&b.epg_url)));
        Ok(found)
    }

    async fn latest_programme_end(
        &self,
        epg_url: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .programmes
            .get(epg_url)
            .and_then(|list| list.iter().map(|p| p.end).max()))
    }

    async fn replace_programmes(
        &self,
        epg_url: &str,
        programmes: &[ProgrammeRecord],
    ) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .programmes
            .insert(epg_url.to_string(), programmes.to_vec());
        Ok(())
    }

    async fn delete_epg(&self, epg_url: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.programmes.remove(epg_url);
        for playlist in state.playlists.values_mut() {
            playlist.unlink_epg(epg_url);
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backup::{CategoryFlagEntry, ChannelFlagEntry};
    use crate::models::SourceKind;

    const URL: &str = "http://host/list.m3u";

    fn channel(id: &str, category: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            name: id.to_uppercase(),
            logo: None,
            epg_id: None,
            category: category.to_string(),
            url: format!("http://host/{}.ts", id),
            drm: None,
            playlist_url: URL.to_string(),
            last_seen: DateTime::from_timestamp(0, 0).unwrap(),
            flags: ChannelFlags::default(),
        }
    }

    fn commit(channels: Vec<ChannelRecord>) -> SnapshotCommit {
        let mut categories: Vec<String> = channels.iter().map(|c| c.category.clone()).collect();
        categories.sort();
        categories.dedup();
        SnapshotCommit {
            playlist_url: URL.to_string(),
            channels,
            categories,
            consumed_staged: Vec::new(),
            synced_at: DateTime::from_timestamp(100, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_playlist_conflict() {
        let store = MemoryStore::new();
        let playlist = PlaylistRecord::new_m3u("Home", URL);
        assert!(store.insert_playlist(&playlist).await.unwrap());
        assert!(!store.insert_playlist(&playlist).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_keeps_stored_flags_and_replaces_set() {
        let store = MemoryStore::new();
        store.insert_playlist(&PlaylistRecord::new_m3u("Home", URL)).await.unwrap();
        assert!(store.commit_snapshot(&commit(vec![channel("a", "News"), channel("b", "News")])).await.unwrap());
        store.toggle_channel_flag(URL, "a", ChannelFlag::Favorite).await.unwrap();

        assert!(store.commit_snapshot(&commit(vec![channel("a", "Sport")])).await.unwrap());

        let channels = store.channels(URL).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert!(channels[0].flags.favorite);
        assert_eq!(channels[0].category, "Sport");

        let categories = store.category_flags(URL).await.unwrap();
        assert_eq!(categories.keys().collect::<Vec<_>>(), vec!["News", "Sport"]);
        assert_eq!(
            store.playlist(URL).await.unwrap().unwrap().last_synced_at,
            DateTime::from_timestamp(100, 0)
        );
    }

    #[tokio::test]
    async fn test_commit_for_removed_playlist_is_rejected() {
        let store = MemoryStore::new();
        assert!(!store.commit_snapshot(&commit(vec![channel("a", "News")])).await.unwrap());
        assert!(store.channels(URL).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_playlist_cascades() {
        let store = MemoryStore::new();
        store.insert_playlist(&PlaylistRecord::new_m3u("Home", URL)).await.unwrap();
        store.commit_snapshot(&commit(vec![channel("a", "News")])).await.unwrap();
        store.toggle_category_flag(URL, "News", CategoryFlag::Hidden).await.unwrap();

        let removed = store.delete_playlist(URL).await.unwrap();
        assert_eq!(removed.map(|p| p.url), Some(URL.to_string()));
        assert!(store.channels(URL).await.unwrap().is_empty());
        assert!(store.all_category_flags().await.unwrap().is_empty());
        assert!(store.delete_playlist(URL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_is_additive() {
        let store = MemoryStore::new();
        store.insert_playlist(&PlaylistRecord::new_m3u("Local", URL)).await.unwrap();
        store.commit_snapshot(&commit(vec![channel("a", "News")])).await.unwrap();

        let block = PlaylistBackup {
            url: URL.to_string(),
            title: "From backup".to_string(),
            kind: SourceKind::M3u,
            credentials: None,
            user_agent: None,
            epg_urls: Vec::new(),
            categories: vec![
                CategoryFlagEntry {
                    category: "News".into(),
                    flags: CategoryFlags { pinned: true, hidden: false },
                },
            ],
            channels: vec![
                ChannelFlagEntry {
                    id: "a".into(),
                    flags: ChannelFlags { favorite: true, muted: false },
                },
                ChannelFlagEntry {
                    id: "later".into(),
                    flags: ChannelFlags { favorite: false, muted: true },
                },
            ],
        };

        let summary = store.import_backup(&[block]).await.unwrap();
        assert_eq!(summary.playlists_skipped, 1);
        assert_eq!(summary.category_flags_added, 0);
        assert_eq!(summary.channel_flags_added, 1);

        assert_eq!(store.playlist(URL).await.unwrap().unwrap().title, "Local");
        assert!(!store.channel(URL, "a").await.unwrap().unwrap().flags.favorite);
        assert!(store.staged_flags(URL).await.unwrap()["later"].muted);
    }

    #[tokio::test]
    async fn test_programmes_for_merges_sources() {
        let store = MemoryStore::new();
        let programme = |epg: &str, start: i64| ProgrammeRecord {
            epg_url: epg.to_string(),
            channel_id: "bbc1".into(),
            start: DateTime::from_timestamp(start, 0).unwrap(),
            end: DateTime::from_timestamp(start + 60, 0).unwrap(),
            title: "News".into(),
            description: None,
            icon: None,
        };
        store.replace_programmes("http://a", &[programme("http://a", 120)]).await.unwrap();
        store.replace_programmes("http://b", &[programme("http://b", 0)]).await.unwrap();

        let found = store
            .programmes_for(&["http://a".to_string(), "http://b".to_string()], "bbc1")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].epg_url, "http://b");
        assert_eq!(
            store.latest_programme_end("http://a").await.unwrap(),
            DateTime::from_timestamp(180, 0)
        );
    }
}
