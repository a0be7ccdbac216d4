//! Xtream listing parser
//!
//! Joins a category listing with a stream listing into channel records.
//! Entries are decoded one by one so a single bad entry only costs that entry.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

use super::types::*;
use crate::error::ParseError;
use crate::models::channel::DEFAULT_CATEGORY;
use crate::models::{ChannelFlags, ChannelRecord, Episode, SourceKind};
use crate::services::playlist_parser::{decode_text, ParseDiagnostic, ParsedPlaylist};

/// Container used when the panel does not report one
const DEFAULT_EXTENSION: &str = "mp4";

/// Decode a top-level JSON array; empty input and `null` are empty listings
fn listing(bytes: &[u8], what: &str) -> Result<Vec<Value>, ParseError> {
    let text = decode_text(bytes)?.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let root: Value = serde_json::from_str(text)
        .map_err(|e| ParseError::Malformed(format!("{} listing is not JSON: {}", what, e)))?;

    match root {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => Ok(entries),
        // Some panels key the listing by id instead of returning an array
        Value::Object(map) if map.values().all(Value::is_object) => {
            Ok(map.into_iter().map(|(_, v)| v).collect())
        }
        _ => Err(ParseError::Malformed(format!(
            "{} listing root is not an array",
            what
        ))),
    }
}

fn decode_entries<T: DeserializeOwned>(
    entries: Vec<Value>,
    what: &str,
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> Vec<T> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<T>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping {} entry {}: {}", what, i + 1, e);
                diagnostics.push(ParseDiagnostic::new(i + 1, format!("{}: {}", what, e)));
                None
            }
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn clean_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse Xtream category and stream listings into channel records
pub fn parse_xtream(
    kind: SourceKind,
    creds: &XtreamCredentials,
    categories: &[u8],
    streams: &[u8],
    playlist_url: &str,
    seen: DateTime<Utc>,
) -> Result<ParsedPlaylist, ParseError> {
    let mut parsed = ParsedPlaylist::default();

    let category_names: HashMap<String, String> =
        decode_entries::<XtreamCategory>(listing(categories, "category")?, "category", &mut parsed.diagnostics)
            .into_iter()
            .map(|c| (c.category_id, clean_name(&c.category_name)))
            .collect();

    let category_of = |id: &Option<String>| {
        id.as_ref()
            .and_then(|id| category_names.get(id))
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    };

    let channel = |id: String, name: &str, logo: Option<String>, epg_id: Option<String>, category: String, url: String| {
        ChannelRecord {
            name: clean_name(name),
            id,
            logo: non_empty(logo),
            epg_id,
            category,
            url,
            drm: None,
            playlist_url: playlist_url.to_string(),
            last_seen: seen,
            flags: ChannelFlags::default(),
        }
    };

    let entries = listing(streams, "stream")?;
    match kind {
        SourceKind::XtreamLive => {
            for stream in decode_entries::<XtreamLiveStream>(entries, "live stream", &mut parsed.diagnostics) {
                let url = creds.live_url(&stream.stream_id);
                parsed.channels.push(channel(
                    stream.stream_id,
                    &stream.name,
                    stream.stream_icon,
                    stream.epg_channel_id,
                    category_of(&stream.category_id),
                    url,
                ));
            }
        }
        SourceKind::XtreamVod => {
            for stream in decode_entries::<XtreamVodStream>(entries, "vod stream", &mut parsed.diagnostics) {
                let extension = non_empty(stream.container_extension)
                    .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
                let url = creds.vod_url(&stream.stream_id, &extension);
                parsed.channels.push(channel(
                    stream.stream_id,
                    &stream.name,
                    stream.stream_icon,
                    None,
                    category_of(&stream.category_id),
                    url,
                ));
            }
        }
        SourceKind::XtreamSeries => {
            for series in decode_entries::<XtreamSeries>(entries, "series", &mut parsed.diagnostics) {
                let url = creds.series_info_url(&series.series_id);
                parsed.channels.push(channel(
                    series.series_id,
                    &series.name,
                    series.cover,
                    None,
                    category_of(&series.category_id),
                    url,
                ));
            }
        }
        SourceKind::M3u => {
            return Err(ParseError::Malformed(
                "m3u playlist given Xtream content".to_string(),
            ))
        }
    }

    Ok(parsed)
}

/// Parse a get_series_info response into episodes ordered by season and number
pub fn parse_series_info(
    creds: &XtreamCredentials,
    series_id: &str,
    bytes: &[u8],
) -> Result<Vec<Episode>, ParseError> {
    let text = decode_text(bytes)?.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let root: Value = serde_json::from_str(text)
        .map_err(|e| ParseError::Malformed(format!("series info is not JSON: {}", e)))?;
    let info: XtreamSeriesInfo = match root {
        Value::Null => return Ok(Vec::new()),
        Value::Array(ref a) if a.is_empty() => return Ok(Vec::new()),
        value => serde_json::from_value(value)
            .map_err(|e| ParseError::Malformed(format!("series info: {}", e)))?,
    };

    let mut episodes = Vec::new();
    for (season_key, list) in info.episodes {
        let season_from_key = season_key.trim().parse::<u32>().ok();
        for (index, episode) in list.into_iter().enumerate() {
            let extension = non_empty(episode.container_extension)
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
            episodes.push(Episode {
                url: creds.series_url(&episode.id, &extension),
                season: episode.season.or(season_from_key).unwrap_or(0),
                episode: episode.episode_num.unwrap_or(index as u32 + 1),
                title: clean_name(&episode.title),
                series_id: series_id.to_string(),
                id: episode.id,
            });
        }
    }

    episodes.sort_by(|a, b| {
        (a.season, a.episode, &a.id).cmp(&(b.season, b.episode, &b.id))
    });
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "http://panel:8080/player_api.php?username=u&password=p&action=get_live_streams";

    fn creds() -> XtreamCredentials {
        XtreamCredentials::new("http://panel:8080", "u", "p")
    }

    fn seen() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_live_streams_join_categories() {
        let categories = br#"[{"category_id":"1","category_name":"News"},{"category_id":2,"category_name":"Sport"}]"#;
        let streams = br#"[
            {"name":"CNN","stream_id":10,"stream_icon":"http://logo/cnn.png","epg_channel_id":"cnn.us","category_id":"1"},
            {"name":"ESPN","stream_id":"11","stream_icon":"","category_id":"2"},
            {"name":"Mystery","stream_id":12,"category_id":"99"}
        ]"#;
        let parsed = parse_xtream(SourceKind::XtreamLive, &creds(), categories, streams, PLAYLIST, seen()).unwrap();

        assert!(parsed.diagnostics.is_empty());
        let names: Vec<_> = parsed.channels.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["News", "Sport", DEFAULT_CATEGORY]);

        let cnn = &parsed.channels[0];
        assert_eq!(cnn.id, "10");
        assert_eq!(cnn.epg_id.as_deref(), Some("cnn.us"));
        assert_eq!(cnn.url, "http://panel:8080/live/u/p/10.ts");
        assert_eq!(parsed.channels[1].logo, None);
    }

    #[test]
    fn test_vod_url_uses_container_extension() {
        let streams = br#"[
            {"name":"Movie","stream_id":5,"container_extension":"mkv"},
            {"name":"Other","stream_id":6}
        ]"#;
        let parsed = parse_xtream(SourceKind::XtreamVod, &creds(), b"[]", streams, PLAYLIST, seen()).unwrap();

        assert_eq!(parsed.channels[0].url, "http://panel:8080/movie/u/p/5.mkv");
        assert_eq!(parsed.channels[1].url, "http://panel:8080/movie/u/p/6.mp4");
    }

    #[test]
    fn test_series_point_at_series_info() {
        let streams = br#"[{"series_id":77,"name":"Show","cover":"http://c/show.jpg"}]"#;
        let parsed = parse_xtream(SourceKind::XtreamSeries, &creds(), b"", streams, PLAYLIST, seen()).unwrap();

        assert_eq!(parsed.channels[0].id, "77");
        assert!(parsed.channels[0].url.ends_with("action=get_series_info&series_id=77"));
        assert_eq!(parsed.channels[0].logo.as_deref(), Some("http://c/show.jpg"));
    }

    #[test]
    fn test_bad_entry_is_skipped() {
        let streams = br#"[{"name":"Good","stream_id":1},{"stream_id":2},"junk"]"#;
        let parsed = parse_xtream(SourceKind::XtreamLive, &creds(), b"[]", streams, PLAYLIST, seen()).unwrap();

        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.diagnostics.len(), 2);
        assert_eq!(parsed.diagnostics[0].line, 2);
    }

    #[test]
    fn test_invalid_root_is_malformed() {
        assert!(matches!(
            parse_xtream(SourceKind::XtreamLive, &creds(), b"[]", b"{not json", PLAYLIST, seen()),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_xtream(SourceKind::XtreamLive, &creds(), b"[]", br#"{"user_info":{"auth":0},"x":1}"#, PLAYLIST, seen()),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_listing() {
        let parsed = parse_xtream(SourceKind::XtreamLive, &creds(), b"null", b"[]", PLAYLIST, seen()).unwrap();
        assert!(parsed.channels.is_empty());
    }

    #[test]
    fn test_series_info_episodes_sorted() {
        let body = br#"{"episodes":{
            "2":[{"id":"201","episode_num":1,"title":"S2E1","container_extension":"mkv"}],
            "1":[{"id":"102","episode_num":"2","title":"S1E2"},{"id":"101","episode_num":1,"title":"S1E1","season":1}]
        }}"#;
        let episodes = parse_series_info(&creds(), "77", body).unwrap();

        let ids: Vec<_> = episodes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "201"]);
        assert_eq!(episodes[2].season, 2);
        assert_eq!(episodes[2].url, "http://panel:8080/series/u/p/201.mkv");
        assert_eq!(episodes[0].series_id, "77");
    }

    #[test]
    fn test_series_info_empty_array() {
        assert!(parse_series_info(&creds(), "1", b"[]").unwrap().is_empty());
    }
}
