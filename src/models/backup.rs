use serde::{Deserialize, Serialize};

use super::channel::{CategoryFlags, ChannelFlags};
use super::playlist::{PlaylistRecord, SourceKind};
use crate::services::xtream::XtreamCredentials;

/// Current backup document version
pub const BACKUP_VERSION: u32 = 1;

/// Portable subscription backup
///
/// Holds no timestamps so unchanged state always encodes to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: u32,
    pub playlists: Vec<PlaylistBackup>,
}

/// One playlist block: metadata plus its user flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistBackup {
    pub url: String,
    pub title: String,
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<XtreamCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub epg_urls: Vec<String>,
    #[serde(default)]
    pub categories: Vec<CategoryFlagEntry>,
    #[serde(default)]
    pub channels: Vec<ChannelFlagEntry>,
}

impl PlaylistBackup {
    /// Playlist record to insert when the URL is not subscribed yet
    pub fn to_record(&self) -> PlaylistRecord {
        let mut epg_urls = self.epg_urls.clone();
        epg_urls.sort();
        epg_urls.dedup();

        PlaylistRecord {
            url: self.url.clone(),
            title: self.title.clone(),
            kind: self.kind,
            credentials: self.credentials.clone(),
            user_agent: self.user_agent.clone(),
            epg_urls,
            last_synced_at: None,
            refreshing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFlagEntry {
    pub category: String,
    #[serde(flatten)]
    pub flags: CategoryFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFlagEntry {
    pub id: String,
    #[serde(flatten)]
    pub flags: ChannelFlags,
}

/// What an import added; existing local records are never overwritten
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub playlists_added: usize,
    pub playlists_skipped: usize,
    pub category_flags_added: usize,
    pub channel_flags_added: usize,
}
