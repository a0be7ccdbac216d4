//! Database row types for PostgreSQL
//!
//! These types map directly to database rows and convert into the domain
//! records in `crate::models`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::StoreError;
use crate::models::{
    CategoryFlagRecord, CategoryFlags, ChannelFlagRecord, ChannelFlags, ChannelRecord, Drm,
    PlaylistRecord, ProgrammeRecord, SourceKind,
};
use crate::services::xtream::XtreamCredentials;

// ============================================================================
// Database Row Types
// ============================================================================

/// Playlist row from database
#[derive(Debug, Clone, FromRow)]
pub struct PlaylistRow {
    pub url: String,
    pub title: String,
    pub kind: String,
    pub xtream_server: Option<String>,
    pub xtream_username: Option<String>,
    pub xtream_password: Option<String>,
    pub user_agent: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl PlaylistRow {
    /// Convert to the domain record; EPG links are loaded separately
    pub fn into_record(self, epg_urls: Vec<String>) -> Result<PlaylistRecord, StoreError> {
        let kind = SourceKind::parse(&self.kind).ok_or_else(|| {
            StoreError::Corrupt(format!("playlist {} has unknown kind {}", self.url, self.kind))
        })?;

        let credentials = match (self.xtream_server, self.xtream_username, self.xtream_password) {
            (Some(server), Some(username), Some(password)) => Some(XtreamCredentials {
                server,
                username,
                password,
            }),
            _ => None,
        };

        Ok(PlaylistRecord {
            url: self.url,
            title: self.title,
            kind,
            credentials,
            user_agent: self.user_agent,
            epg_urls,
            last_synced_at: self.last_synced_at,
            refreshing: false,
        })
    }
}

/// Channel row from database
#[derive(Debug, Clone, FromRow)]
pub struct ChannelRow {
    pub playlist_url: String,
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    pub epg_id: Option<String>,
    pub category: String,
    pub url: String,
    pub license_type: Option<String>,
    pub license_key: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub favorite: bool,
    pub muted: bool,
}

impl From<ChannelRow> for ChannelRecord {
    fn from(row: ChannelRow) -> Self {
        ChannelRecord {
            drm: Drm::new(row.license_type.as_deref(), row.license_key.as_deref()),
            id: row.id,
            name: row.name,
            logo: row.logo,
            epg_id: row.epg_id,
            category: row.category,
            url: row.url,
            playlist_url: row.playlist_url,
            last_seen: row.last_seen,
            flags: ChannelFlags {
                favorite: row.favorite,
                muted: row.muted,
            },
        }
    }
}

/// Category flag row from database
#[derive(Debug, Clone, FromRow)]
pub struct CategoryFlagRow {
    pub playlist_url: String,
    pub category: String,
    pub pinned: bool,
    pub hidden: bool,
}

impl CategoryFlagRow {
    pub fn flags(&self) -> CategoryFlags {
        CategoryFlags {
            pinned: self.pinned,
            hidden: self.hidden,
        }
    }
}

impl From<CategoryFlagRow> for CategoryFlagRecord {
    fn from(row: CategoryFlagRow) -> Self {
        CategoryFlagRecord {
            flags: row.flags(),
            playlist_url: row.playlist_url,
            category: row.category,
        }
    }
}

/// Channel flag row, from `channels` or `staged_channel_flags`
#[derive(Debug, Clone, FromRow)]
pub struct ChannelFlagRow {
    pub playlist_url: String,
    pub channel_id: String,
    pub favorite: bool,
    pub muted: bool,
}

impl ChannelFlagRow {
    pub fn flags(&self) -> ChannelFlags {
        ChannelFlags {
            favorite: self.favorite,
            muted: self.muted,
        }
    }
}

impl From<ChannelFlagRow> for ChannelFlagRecord {
    fn from(row: ChannelFlagRow) -> Self {
        ChannelFlagRecord {
            flags: row.flags(),
            playlist_url: row.playlist_url,
            channel_id: row.channel_id,
        }
    }
}

/// Programme row from database
#[derive(Debug, Clone, FromRow)]
pub struct ProgrammeRow {
    pub epg_url: String,
    pub channel_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

impl From<ProgrammeRow> for ProgrammeRecord {
    fn from(row: ProgrammeRow) -> Self {
        ProgrammeRecord {
            epg_url: row.epg_url,
            channel_id: row.channel_id,
            start: row.start_at,
            end: row.end_at,
            title: row.title,
            description: row.description,
            icon: row.icon,
        }
    }
}

// ============================================================================
// Batch columns (for UNNEST inserts)
// ============================================================================

/// Column-wise channel batch, bound as Postgres arrays
#[derive(Debug, Default)]
pub struct ChannelColumns {
    pub ids: Vec<String>,
    pub positions: Vec<i32>,
    pub names: Vec<String>,
    pub logos: Vec<Option<String>>,
    pub epg_ids: Vec<Option<String>>,
    pub categories: Vec<String>,
    pub urls: Vec<String>,
    pub license_types: Vec<Option<String>>,
    pub license_keys: Vec<Option<String>>,
    pub last_seen: Vec<DateTime<Utc>>,
    pub favorites: Vec<bool>,
    pub muted: Vec<bool>,
}

impl ChannelColumns {
    pub fn from_channels(channels: &[ChannelRecord], first_position: usize) -> Self {
        let mut cols = ChannelColumns::default();
        for (offset, c) in channels.iter().enumerate() {
            cols.ids.push(c.id.clone());
            cols.positions.push((first_position + offset) as i32);
            cols.names.push(c.name.clone());
            cols.logos.push(c.logo.clone());
            cols.epg_ids.push(c.epg_id.clone());
            cols.categories.push(c.category.clone());
            cols.urls.push(c.url.clone());
            cols.license_types.push(c.drm.as_ref().map(|d| d.license_type.clone()));
            cols.license_keys.push(c.drm.as_ref().map(|d| d.license_key.clone()));
            cols.last_seen.push(c.last_seen);
            cols.favorites.push(c.flags.favorite);
            cols.muted.push(c.flags.muted);
        }
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_row_unknown_kind_is_corrupt() {
        let row = PlaylistRow {
            url: "http://host/list.m3u".into(),
            title: "Home".into(),
            kind: "radio".into(),
            xtream_server: None,
            xtream_username: None,
            xtream_password: None,
            user_agent: None,
            last_synced_at: None,
        };
        assert!(matches!(row.into_record(Vec::new()), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_playlist_row_credentials() {
        let row = PlaylistRow {
            url: "http://panel/player_api.php".into(),
            title: "Panel".into(),
            kind: "xtream-live".into(),
            xtream_server: Some("http://panel".into()),
            xtream_username: Some("u".into()),
            xtream_password: Some("p".into()),
            user_agent: None,
            last_synced_at: None,
        };
        let record = row.into_record(vec!["http://epg".into()]).unwrap();
        assert_eq!(record.kind, SourceKind::XtreamLive);
        assert_eq!(record.credentials.unwrap().username, "u");
        assert_eq!(record.epg_urls, vec!["http://epg"]);
    }

    #[test]
    fn test_channel_columns_positions() {
        let channel = ChannelRecord {
            id: "a".into(),
            name: "A".into(),
            logo: None,
            epg_id: None,
            category: "News".into(),
            url: "http://host/a.ts".into(),
            drm: Drm::new(Some("clearkey"), Some("k")),
            playlist_url: "http://host/list.m3u".into(),
            last_seen: DateTime::from_timestamp(0, 0).unwrap(),
            flags: ChannelFlags::default(),
        };
        let cols = ChannelColumns::from_channels(&[channel.clone(), channel], 500);
        assert_eq!(cols.positions, vec![500, 501]);
        assert_eq!(cols.license_types[0].as_deref(), Some("clearkey"));
    }
}
