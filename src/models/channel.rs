use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned when a source gives none
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// User-owned flags of a channel; survive refreshes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFlags {
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub muted: bool,
}

impl ChannelFlags {
    pub fn is_default(&self) -> bool {
        !self.favorite && !self.muted
    }
}

/// User-owned flags of a (playlist, category) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFlags {
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// Which channel flag a toggle targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFlag {
    Favorite,
    Muted,
}

impl ChannelFlags {
    pub fn toggle(&mut self, flag: ChannelFlag) {
        match flag {
            ChannelFlag::Favorite => self.favorite = !self.favorite,
            ChannelFlag::Muted => self.muted = !self.muted,
        }
    }
}

/// Which category flag a toggle targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFlag {
    Pinned,
    Hidden,
}

impl CategoryFlags {
    pub fn toggle(&mut self, flag: CategoryFlag) {
        match flag {
            CategoryFlag::Pinned => self.pinned = !self.pinned,
            CategoryFlag::Hidden => self.hidden = !self.hidden,
        }
    }
}

/// Category flags of one (playlist, category) key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFlagRecord {
    pub playlist_url: String,
    pub category: String,
    #[serde(flatten)]
    pub flags: CategoryFlags,
}

/// Channel flags of one (playlist, channel id) key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFlagRecord {
    pub playlist_url: String,
    pub channel_id: String,
    #[serde(flatten)]
    pub flags: ChannelFlags,
}

/// Opaque DRM license pair passed through from the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drm {
    pub license_type: String,
    pub license_key: String,
}

impl Drm {
    /// Both halves must be non-empty, otherwise no DRM is attached
    pub fn new(license_type: Option<&str>, license_key: Option<&str>) -> Option<Self> {
        let license_type = license_type.map(str::trim).filter(|s| !s.is_empty())?;
        let license_key = license_key.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Drm {
            license_type: license_type.to_string(),
            license_key: license_key.to_string(),
        })
    }
}

/// Normalized channel produced by every playlist format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    /// Source-provided id, or a hash of the playback URL
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Guide identifier matched against EPG channel ids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_id: Option<String>,
    pub category: String,
    /// Always absolute
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drm: Option<Drm>,
    pub playlist_url: String,
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub flags: ChannelFlags,
}

impl ChannelRecord {
    /// True when every field except flags and `last_seen` matches
    pub fn same_content(&self, other: &ChannelRecord) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.logo == other.logo
            && self.epg_id == other.epg_id
            && self.category == other.category
            && self.url == other.url
            && self.drm == other.drm
            && self.playlist_url == other.playlist_url
    }

    /// Identifier used to look up programmes
    pub fn guide_id(&self) -> &str {
        self.epg_id.as_deref().unwrap_or(&self.id)
    }
}

/// Xtream series episode, fetched on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub series_id: String,
    pub season: u32,
    pub episode: u32,
    pub title: String,
    pub url: String,
}
