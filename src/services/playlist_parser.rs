//! Playlist format dispatch
//!
//! Every source kind parses into the same [`ParsedPlaylist`] shape. Parsing is
//! pure: the caller supplies the raw bytes and the timestamp stamped on each
//! channel as `last_seen`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ParseError;
use crate::models::{ChannelRecord, PlaylistRecord, SourceKind};
use crate::services::m3u_parser::parse_m3u;
use crate::services::xtream::parse_xtream;

/// Recoverable problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostic {
    /// 1-based line for M3U, 1-based entry index for Xtream listings
    pub line: usize,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedPlaylist {
    pub channels: Vec<ChannelRecord>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Raw content fetched for one playlist
#[derive(Debug, Clone)]
pub enum SourceContent {
    M3u(Vec<u8>),
    Xtream {
        categories: Vec<u8>,
        streams: Vec<u8>,
    },
}

/// Decode fetched bytes as UTF-8 text, dropping a leading BOM
pub fn decode_text(bytes: &[u8]) -> Result<&str, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ParseError::Encoding(format!("content is not UTF-8 text (byte {})", e.valid_up_to()))
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Parse fetched content for `playlist` into normalized channels
pub fn parse_playlist(
    playlist: &PlaylistRecord,
    content: &SourceContent,
    seen: DateTime<Utc>,
) -> Result<ParsedPlaylist, ParseError> {
    match (playlist.kind, content) {
        (SourceKind::M3u, SourceContent::M3u(bytes)) => {
            let text = decode_text(bytes)?;
            Ok(parse_m3u(text, &playlist.url, seen))
        }
        (kind, SourceContent::Xtream { categories, streams }) if kind.is_xtream() => {
            let creds = playlist.credentials.as_ref().ok_or_else(|| {
                ParseError::Malformed(format!("{} playlist has no credentials", kind))
            })?;
            parse_xtream(kind, creds, categories, streams, &playlist.url, seen)
        }
        (kind, _) => Err(ParseError::Malformed(format!(
            "content does not match source kind {}",
            kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::xtream::XtreamCredentials;

    fn seen() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_non_utf8_is_encoding_error() {
        let playlist = PlaylistRecord::new_m3u("x", "http://host/list.m3u");
        let content = SourceContent::M3u(vec![0x23, 0xff, 0xfe, 0x00]);
        assert!(matches!(
            parse_playlist(&playlist, &content, seen()),
            Err(ParseError::Encoding(_))
        ));
    }

    #[test]
    fn test_empty_m3u_is_empty_sequence() {
        let playlist = PlaylistRecord::new_m3u("x", "http://host/list.m3u");
        let parsed = parse_playlist(&playlist, &SourceContent::M3u(Vec::new()), seen()).unwrap();
        assert!(parsed.channels.is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_malformed() {
        let playlist = PlaylistRecord::new_m3u("x", "http://host/list.m3u");
        let content = SourceContent::Xtream {
            categories: b"[]".to_vec(),
            streams: b"[]".to_vec(),
        };
        assert!(matches!(
            parse_playlist(&playlist, &content, seen()),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_xtream_dispatch() {
        let creds = XtreamCredentials::new("http://panel:8080", "u", "p");
        let playlist = PlaylistRecord::new_xtream("Panel", creds, SourceKind::XtreamLive);
        let content = SourceContent::Xtream {
            categories: br#"[{"category_id":"1","category_name":"News"}]"#.to_vec(),
            streams: br#"[{"name":"CNN","stream_id":10,"category_id":"1"}]"#.to_vec(),
        };
        let parsed = parse_playlist(&playlist, &content, seen()).unwrap();
        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].url, "http://panel:8080/live/u/p/10.ts");
        assert_eq!(parsed.channels[0].playlist_url, playlist.url);
    }
}
