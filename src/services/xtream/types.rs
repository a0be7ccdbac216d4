//! Xtream Codes API Types
//!
//! Type definitions for the Xtream Codes Player API v2 responses that the
//! ingestion engine consumes. Panels are inconsistent about numeric fields,
//! so ids accept both JSON strings and numbers.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::models::SourceKind;

/// Panel credentials of an Xtream subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtreamCredentials {
    /// Server base URL (e.g., "http://example.com:8080")
    pub server: String,
    pub username: String,
    pub password: String,
}

impl XtreamCredentials {
    pub fn new(server: &str, username: &str, password: &str) -> Self {
        Self {
            server: server.trim().trim_end_matches('/').to_string(),
            username: username.trim().to_string(),
            password: password.to_string(),
        }
    }

    /// Build the player_api.php base URL
    pub fn api_url(&self) -> String {
        format!(
            "{}/player_api.php?username={}&password={}",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}&action={}", self.api_url(), action)
    }

    /// Stream list endpoint; doubles as the playlist's primary key
    pub fn playlist_url(&self, kind: SourceKind) -> String {
        match kind {
            SourceKind::XtreamVod => self.action_url("get_vod_streams"),
            SourceKind::XtreamSeries => self.action_url("get_series"),
            _ => self.action_url("get_live_streams"),
        }
    }

    /// Category list endpoint for the given kind
    pub fn categories_url(&self, kind: SourceKind) -> String {
        match kind {
            SourceKind::XtreamVod => self.action_url("get_vod_categories"),
            SourceKind::XtreamSeries => self.action_url("get_series_categories"),
            _ => self.action_url("get_live_categories"),
        }
    }

    pub fn series_info_url(&self, series_id: &str) -> String {
        format!("{}&series_id={}", self.action_url("get_series_info"), series_id)
    }

    /// `user/pass` path prefix of playback URLs
    fn path_credentials(&self) -> String {
        format!(
            "{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }

    /// Build playback URL for live streams
    pub fn live_url(&self, stream_id: &str) -> String {
        format!("{}/live/{}/{}.ts", self.server, self.path_credentials(), stream_id)
    }

    /// Build playback URL for VOD
    pub fn vod_url(&self, stream_id: &str, extension: &str) -> String {
        format!(
            "{}/movie/{}/{}.{}",
            self.server,
            self.path_credentials(),
            stream_id,
            extension
        )
    }

    /// Build playback URL for series episodes
    pub fn series_url(&self, episode_id: &str, extension: &str) -> String {
        format!(
            "{}/series/{}/{}.{}",
            self.server,
            self.path_credentials(),
            episode_id,
            extension
        )
    }

    /// Build EPG XML URL
    pub fn epg_url(&self) -> String {
        format!(
            "{}/xmltv.php?username={}&password={}",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }
}

/// Mask every `password=` query value so panel URLs can be logged
pub fn redact_password(text: &str) -> String {
    const KEY: &str = "password=";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(KEY) {
        let value_start = start + KEY.len();
        out.push_str(&rest[..value_start]);
        out.push_str("***");
        let tail = &rest[value_start..];
        let value_end = tail
            .find(|c: char| matches!(c, '&' | '#' | '"' | '\'') || c.is_whitespace())
            .unwrap_or(tail.len());
        rest = &tail[value_end..];
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Lenient field decoding
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(StringOrNumber::into_string)
}

fn opt_id_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .map(StringOrNumber::into_string)
        .filter(|s| !s.is_empty()))
}

fn opt_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            Some(StringOrNumber::Int(n)) => u32::try_from(n).ok(),
            Some(StringOrNumber::Float(n)) if n >= 0.0 => Some(n as u32),
            Some(StringOrNumber::String(s)) => s.trim().parse().ok(),
            _ => None,
        },
    )
}

// ============================================================================
// Category Types
// ============================================================================

/// Category for live, VOD, or series
#[derive(Debug, Deserialize, Clone)]
pub struct XtreamCategory {
    #[serde(deserialize_with = "id_string")]
    pub category_id: String,
    pub category_name: String,
}

// ============================================================================
// Stream Types
// ============================================================================

/// Live stream (channel) information
#[derive(Debug, Deserialize, Clone)]
pub struct XtreamLiveStream {
    pub name: String,
    #[serde(deserialize_with = "id_string")]
    pub stream_id: String,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub epg_channel_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub category_id: Option<String>,
}

/// VOD (movie) stream information
#[derive(Debug, Deserialize, Clone)]
pub struct XtreamVodStream {
    pub name: String,
    #[serde(deserialize_with = "id_string")]
    pub stream_id: String,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
}

/// Series information from get_series
#[derive(Debug, Deserialize, Clone)]
pub struct XtreamSeries {
    #[serde(deserialize_with = "id_string")]
    pub series_id: String,
    pub name: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub category_id: Option<String>,
}

// ============================================================================
// Series detail Types
// ============================================================================

/// Detailed series information (from get_series_info)
#[derive(Debug, Deserialize, Clone)]
pub struct XtreamSeriesInfo {
    /// Episodes grouped by season number (key is season number as string)
    #[serde(default)]
    pub episodes: HashMap<String, Vec<XtreamEpisode>>,
}

/// Episode information
#[derive(Debug, Deserialize, Clone)]
pub struct XtreamEpisode {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_number")]
    pub episode_num: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    pub season: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_trim_trailing_slash() {
        let creds = XtreamCredentials::new("http://example.com:8080/", "user", "pass");
        assert_eq!(
            creds.api_url(),
            "http://example.com:8080/player_api.php?username=user&password=pass"
        );
        assert!(!creds.api_url().contains("//player_api"));
    }

    #[test]
    fn test_playlist_urls_differ_per_kind() {
        let creds = XtreamCredentials::new("http://example.com", "u", "p");
        let live = creds.playlist_url(SourceKind::XtreamLive);
        let vod = creds.playlist_url(SourceKind::XtreamVod);
        let series = creds.playlist_url(SourceKind::XtreamSeries);
        assert!(live.ends_with("action=get_live_streams"));
        assert!(vod.ends_with("action=get_vod_streams"));
        assert!(series.ends_with("action=get_series"));
    }

    #[test]
    fn test_credentials_are_query_encoded() {
        let creds = XtreamCredentials::new("http://example.com", "john doe", "p&ss");
        assert!(creds.api_url().contains("username=john%20doe&password=p%26ss"));
    }

    #[test]
    fn test_playback_paths_escape_credentials() {
        let creds = XtreamCredentials::new("http://example.com", "a b", "p#ss/?1");
        assert_eq!(
            creds.live_url("42"),
            "http://example.com/live/a%20b/p%23ss%2F%3F1/42.ts"
        );
        assert_eq!(
            creds.series_url("7", "mkv"),
            "http://example.com/series/a%20b/p%23ss%2F%3F1/7.mkv"
        );

        let plain = XtreamCredentials::new("http://example.com", "user", "pass-1_x");
        assert_eq!(plain.vod_url("9", "mp4"), "http://example.com/movie/user/pass-1_x/9.mp4");
    }

    #[test]
    fn test_redact_password_masks_every_value() {
        assert_eq!(
            redact_password("http://p/player_api.php?username=u&password=secret&action=x"),
            "http://p/player_api.php?username=u&password=***&action=x"
        );
        assert_eq!(
            redact_password("Refresh of http://p/a?password=one failed: Not found: http://p/b?password=two"),
            "Refresh of http://p/a?password=*** failed: Not found: http://p/b?password=***"
        );
        assert_eq!(redact_password("http://p/live"), "http://p/live");
    }

    #[test]
    fn test_stream_id_accepts_string_or_number() {
        let a: XtreamLiveStream =
            serde_json::from_str(r#"{"name":"A","stream_id":42,"category_id":"7"}"#).unwrap();
        let b: XtreamLiveStream =
            serde_json::from_str(r#"{"name":"B","stream_id":"43","category_id":7}"#).unwrap();
        assert_eq!(a.stream_id, "42");
        assert_eq!(b.stream_id, "43");
        assert_eq!(b.category_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_episode_numbers_lenient() {
        let ep: XtreamEpisode = serde_json::from_str(
            r#"{"id":"9001","episode_num":"3","title":"Pilot","container_extension":"mkv","season":1}"#,
        )
        .unwrap();
        assert_eq!(ep.episode_num, Some(3));
        assert_eq!(ep.season, Some(1));
    }
}
