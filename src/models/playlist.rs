use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::xtream::XtreamCredentials;

/// Kind of playlist source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "m3u")]
    M3u,
    #[serde(rename = "xtream-live")]
    XtreamLive,
    #[serde(rename = "xtream-vod")]
    XtreamVod,
    #[serde(rename = "xtream-series")]
    XtreamSeries,
}

impl SourceKind {
    pub const XTREAM: [SourceKind; 3] = [
        SourceKind::XtreamLive,
        SourceKind::XtreamVod,
        SourceKind::XtreamSeries,
    ];

    pub fn is_xtream(&self) -> bool {
        !matches!(self, SourceKind::M3u)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::M3u => "m3u",
            SourceKind::XtreamLive => "xtream-live",
            SourceKind::XtreamVod => "xtream-vod",
            SourceKind::XtreamSeries => "xtream-series",
        }
    }

    /// Parse the stored string form; also accepts the bare Xtream type names
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "m3u" => Some(SourceKind::M3u),
            "xtream-live" | "live" => Some(SourceKind::XtreamLive),
            "xtream-vod" | "vod" => Some(SourceKind::XtreamVod),
            "xtream-series" | "series" => Some(SourceKind::XtreamSeries),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscribed playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRecord {
    /// Source URL (primary key)
    pub url: String,
    pub title: String,
    pub kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<XtreamCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Associated EPG source URLs, kept sorted and unique
    #[serde(default)]
    pub epg_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refreshing: bool,
}

impl PlaylistRecord {
    pub fn new_m3u(title: &str, url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            kind: SourceKind::M3u,
            credentials: None,
            user_agent: None,
            epg_urls: Vec::new(),
            last_synced_at: None,
            refreshing: false,
        }
    }

    pub fn new_xtream(title: &str, creds: XtreamCredentials, kind: SourceKind) -> Self {
        Self {
            url: creds.playlist_url(kind),
            title: title.to_string(),
            kind,
            credentials: Some(creds),
            user_agent: None,
            epg_urls: Vec::new(),
            last_synced_at: None,
            refreshing: false,
        }
    }

    /// Add an EPG source, keeping the list sorted and unique
    pub fn link_epg(&mut self, epg_url: &str) -> bool {
        match self.epg_urls.binary_search_by(|u| u.as_str().cmp(epg_url)) {
            Ok(_) => false,
            Err(pos) => {
                self.epg_urls.insert(pos, epg_url.to_string());
                true
            }
        }
    }

    pub fn unlink_epg(&mut self, epg_url: &str) -> bool {
        let before = self.epg_urls.len();
        self.epg_urls.retain(|u| u != epg_url);
        before != self.epg_urls.len()
    }
}

/// Refresh state of one playlist or EPG source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncStatus {
    #[serde(rename_all = "camelCase")]
    Idle {
        #[serde(skip_serializing_if = "Option::is_none")]
        last_synced_at: Option<DateTime<Utc>>,
        /// Reason of the last failed attempt, kept until the next attempt
        #[serde(skip_serializing_if = "Option::is_none")]
        last_error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Refreshing { started_at: DateTime<Utc> },
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Idle {
            last_synced_at: None,
            last_error: None,
        }
    }
}

impl SyncStatus {
    pub fn is_refreshing(&self) -> bool {
        matches!(self, SyncStatus::Refreshing { .. })
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            SyncStatus::Idle { last_error, .. } => last_error.as_deref(),
            SyncStatus::Refreshing { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_roundtrip() {
        for kind in [
            SourceKind::M3u,
            SourceKind::XtreamLive,
            SourceKind::XtreamVod,
            SourceKind::XtreamSeries,
        ] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("VOD"), Some(SourceKind::XtreamVod));
        assert_eq!(SourceKind::parse("radio"), None);
    }

    #[test]
    fn test_link_epg_sorted_unique() {
        let mut playlist = PlaylistRecord::new_m3u("Home", "http://host/list.m3u");
        assert!(playlist.link_epg("http://b/epg.xml"));
        assert!(playlist.link_epg("http://a/epg.xml"));
        assert!(!playlist.link_epg("http://b/epg.xml"));
        assert_eq!(playlist.epg_urls, vec!["http://a/epg.xml", "http://b/epg.xml"]);
        assert!(playlist.unlink_epg("http://a/epg.xml"));
        assert!(!playlist.unlink_epg("http://a/epg.xml"));
    }

    #[test]
    fn test_status_serializes_tagged() {
        let status = SyncStatus::Idle {
            last_synced_at: None,
            last_error: Some("HTTP error: 404".into()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["lastError"], "HTTP error: 404");
    }
}
