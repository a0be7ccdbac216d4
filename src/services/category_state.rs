//! Per-(playlist, category) pinned/hidden flags

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::db::Store;
use crate::error::IngestError;
use crate::models::{CategoryFlag, CategoryFlags};
use crate::services::xtream::redact_password;

pub struct CategoryStateStore {
    store: Arc<dyn Store>,
}

impl CategoryStateStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn pin_or_unpin(
        &self,
        playlist_url: &str,
        category: &str,
    ) -> Result<Option<CategoryFlags>, IngestError> {
        self.toggle(playlist_url, category, CategoryFlag::Pinned).await
    }

    pub async fn hide_or_unhide(
        &self,
        playlist_url: &str,
        category: &str,
    ) -> Result<Option<CategoryFlags>, IngestError> {
        self.toggle(playlist_url, category, CategoryFlag::Hidden).await
    }

    /// Flip one flag; `None` (nothing written) when no channel of the
    /// playlist is in `category` anymore
    async fn toggle(
        &self,
        playlist_url: &str,
        category: &str,
        flag: CategoryFlag,
    ) -> Result<Option<CategoryFlags>, IngestError> {
        if self.store.playlist(playlist_url).await?.is_none() {
            return Err(IngestError::NotFound(playlist_url.to_string()));
        }
        if !self.store.has_category(playlist_url, category).await? {
            debug!(
                "Category {:?} not in {}, toggle ignored",
                category,
                redact_password(playlist_url)
            );
            return Ok(None);
        }
        let flags = self
            .store
            .toggle_category_flag(playlist_url, category, flag)
            .await?;
        Ok(Some(flags))
    }

    pub async fn flags(
        &self,
        playlist_url: &str,
    ) -> Result<BTreeMap<String, CategoryFlags>, IngestError> {
        if self.store.playlist(playlist_url).await?.is_none() {
            return Err(IngestError::NotFound(playlist_url.to_string()));
        }
        Ok(self.store.category_flags(playlist_url).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, SnapshotCommit};
    use crate::models::{ChannelFlags, ChannelRecord, PlaylistRecord};
    use chrono::DateTime;

    const URL: &str = "http://host/list.m3u";

    async fn seeded() -> (Arc<MemoryStore>, CategoryStateStore) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_playlist(&PlaylistRecord::new_m3u("List", URL))
            .await
            .unwrap();
        let channel = ChannelRecord {
            id: "1".to_string(),
            name: "One".to_string(),
            logo: None,
            epg_id: None,
            category: "News".to_string(),
            url: "http://host/1.ts".to_string(),
            drm: None,
            playlist_url: URL.to_string(),
            last_seen: DateTime::from_timestamp(0, 0).unwrap(),
            flags: ChannelFlags::default(),
        };
        store
            .commit_snapshot(&SnapshotCommit {
                playlist_url: URL.to_string(),
                channels: vec![channel],
                categories: vec!["News".to_string()],
                consumed_staged: Vec::new(),
                synced_at: DateTime::from_timestamp(0, 0).unwrap(),
            })
            .await
            .unwrap();
        let categories = CategoryStateStore::new(store.clone());
        (store, categories)
    }

    #[tokio::test]
    async fn test_toggle_twice_restores() {
        let (_store, categories) = seeded().await;

        let flags = categories.pin_or_unpin(URL, "News").await.unwrap().unwrap();
        assert!(flags.pinned && !flags.hidden);
        let flags = categories.pin_or_unpin(URL, "News").await.unwrap().unwrap();
        assert!(!flags.pinned);

        categories.hide_or_unhide(URL, "News").await.unwrap();
        assert!(categories.flags(URL).await.unwrap()["News"].hidden);
    }

    #[tokio::test]
    async fn test_absent_category_is_noop() {
        let (store, categories) = seeded().await;
        assert_eq!(categories.pin_or_unpin(URL, "Sport").await.unwrap(), None);
        assert!(!store.category_flags(URL).await.unwrap().contains_key("Sport"));
    }

    #[tokio::test]
    async fn test_unknown_playlist() {
        let (_store, categories) = seeded().await;
        assert!(matches!(
            categories.hide_or_unhide("http://nope", "News").await,
            Err(IngestError::NotFound(_))
        ));
    }
}
