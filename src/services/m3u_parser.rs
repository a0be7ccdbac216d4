//! M3U extended playlist parser
//!
//! Line-oriented: `#EXTINF` directives carry `key="value"` attributes and a
//! title, the next non-comment line is the stream URL. Broken directives are
//! reported as diagnostics and skipped, everything well-formed is returned.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use url::Url;

use crate::models::channel::DEFAULT_CATEGORY;
use crate::models::{ChannelFlags, ChannelRecord, Drm};
use crate::services::playlist_parser::{ParseDiagnostic, ParsedPlaylist};

const FILE_SCHEME: &str = "file:///";
const KODI_LICENSE_TYPE: &str = "inputstream.adaptive.license_type";
const KODI_LICENSE_KEY: &str = "inputstream.adaptive.license_key";

lazy_static! {
    /// Regex to normalize multiple whitespaces into single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"([\w.]+(?:-[\w.]+)*)="([^"]*)""#).unwrap();
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: HashMap<String, String>,
    title: String,
}

impl ExtinfData {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Entry state accumulated between a directive and its URL line
#[derive(Debug, Default)]
struct PendingEntry {
    extinf: Option<ExtinfData>,
    group: Option<String>,
    license_type: Option<String>,
    license_key: Option<String>,
    /// Line of the directive that opened this entry
    line: usize,
}

impl PendingEntry {
    fn is_open(&self) -> bool {
        self.extinf.is_some()
    }
}

/// Index of the first comma outside double quotes, `None` when quotes are unbalanced
fn split_comma(content: &str) -> Option<Option<usize>> {
    let mut in_quote = false;
    let mut comma = None;
    for (i, c) in content.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            ',' if !in_quote && comma.is_none() => comma = Some(i),
            _ => {}
        }
    }
    if in_quote && comma.is_none() {
        None
    } else {
        Some(comma)
    }
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> Result<ExtinfData, String> {
    let content = line
        .strip_prefix("#EXTINF:")
        .ok_or_else(|| "not an #EXTINF directive".to_string())?;

    let first_comma = match split_comma(content) {
        Some(Some(pos)) => pos,
        Some(None) => return Err("missing ',' before title".to_string()),
        None => return Err("unbalanced quote in attributes".to_string()),
    };

    let header = &content[..first_comma];
    let title = content[first_comma + 1..].trim().to_string();

    // Parse attributes
    let mut attributes = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(header) {
        let key = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        attributes.insert(key, value);
    }

    Ok(ExtinfData {
        attributes,
        title,
    })
}

/// Generate SHA1 hash of URL, used as the fallback channel identifier
pub fn hash_url(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

/// Make a playback URL absolute
///
/// `file:///rest` is rewritten onto the playlist's own directory: the last
/// path segment of the playlist URL is dropped and `rest` appended, keeping
/// the playlist's scheme and host. Scheme-less references are joined onto
/// the playlist URL.
pub fn resolve_playback_url(raw: &str, playlist_url: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(rest) = raw.strip_prefix(FILE_SCHEME) {
        let Ok(mut base) = Url::parse(playlist_url) else {
            return Some(raw.to_string());
        };
        let mut segments: Vec<String> = base
            .path_segments()
            .map(|s| s.map(str::to_string).collect())
            .unwrap_or_default();
        segments.pop();
        segments.extend(rest.split('/').filter(|s| !s.is_empty()).map(str::to_string));

        base.set_path(&format!("/{}", segments.join("/")));
        base.set_query(None);
        base.set_fragment(None);
        return Some(base.to_string());
    }

    if Url::parse(raw).is_ok() {
        return Some(raw.to_string());
    }

    Url::parse(playlist_url)
        .and_then(|base| base.join(raw))
        .ok()
        .map(|u| u.to_string())
}

/// Title fallback: last path segment of the URL
fn title_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}

fn build_channel(
    pending: PendingEntry,
    url: String,
    playlist_url: &str,
    seen: DateTime<Utc>,
) -> ChannelRecord {
    let extinf = pending.extinf.unwrap_or_default();

    let epg_id = extinf.attr("tvg-id").map(str::to_string);
    let id = epg_id.clone().unwrap_or_else(|| hash_url(&url));

    let mut name = normalize_text(&extinf.title);
    if name.is_empty() {
        name = extinf
            .attr("tvg-name")
            .map(normalize_text)
            .unwrap_or_else(|| title_from_url(&url));
    }

    let category = extinf
        .attr("group-title")
        .map(normalize_text)
        .or(pending.group)
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let logo = extinf
        .attr("tvg-logo")
        .or_else(|| extinf.attr("cover"))
        .map(str::to_string);

    ChannelRecord {
        id,
        name,
        logo,
        epg_id,
        category,
        url,
        drm: Drm::new(pending.license_type.as_deref(), pending.license_key.as_deref()),
        playlist_url: playlist_url.to_string(),
        last_seen: seen,
        flags: ChannelFlags::default(),
    }
}

/// Parse M3U text into channels, in document order
pub fn parse_m3u(content: &str, playlist_url: &str, seen: DateTime<Utc>) -> ParsedPlaylist {
    let mut parsed = ParsedPlaylist::default();
    let mut pending = PendingEntry::default();
    // Set after a broken directive so its URL line is not taken as a bare entry
    let mut skip_next_url = false;

    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();

        if line.is_empty() || line == "#EXTM3U" || line.starts_with("#EXTM3U ") {
            continue;
        }

        if line.starts_with("#EXTINF:") {
            if pending.is_open() {
                parsed.diagnostics.push(ParseDiagnostic::new(
                    pending.line,
                    "directive without a stream URL",
                ));
                pending = PendingEntry::default();
            }
            match parse_extinf(line) {
                Ok(extinf) => {
                    pending.extinf = Some(extinf);
                    pending.line = line_no;
                    skip_next_url = false;
                }
                Err(reason) => {
                    tracing::warn!("Skipping malformed #EXTINF at line {}: {}", line_no, reason);
                    parsed.diagnostics.push(ParseDiagnostic::new(line_no, reason));
                    pending = PendingEntry::default();
                    skip_next_url = true;
                }
            }
            continue;
        }

        if let Some(group) = line.strip_prefix("#EXTGRP:") {
            let group = normalize_text(group);
            if !group.is_empty() {
                pending.group = Some(group);
            }
            continue;
        }

        if let Some(prop) = line.strip_prefix("#KODIPROP:") {
            if let Some((key, value)) = prop.split_once('=') {
                match key.trim() {
                    KODI_LICENSE_TYPE => pending.license_type = Some(value.trim().to_string()),
                    KODI_LICENSE_KEY => pending.license_key = Some(value.trim().to_string()),
                    _ => {}
                }
            }
            continue;
        }

        // Skip other comments and unknown directives
        if line.starts_with('#') {
            continue;
        }

        if skip_next_url {
            skip_next_url = false;
            pending = PendingEntry::default();
            continue;
        }

        // Bare URL lines are only taken when they are already absolute
        if !pending.is_open() && !line.contains("://") {
            parsed
                .diagnostics
                .push(ParseDiagnostic::new(line_no, "unexpected text outside an entry"));
            continue;
        }

        match resolve_playback_url(line, playlist_url) {
            Some(url) => {
                let entry = std::mem::take(&mut pending);
                parsed.channels.push(build_channel(entry, url, playlist_url, seen));
            }
            None => {
                parsed
                    .diagnostics
                    .push(ParseDiagnostic::new(line_no, "unresolvable stream URL"));
                pending = PendingEntry::default();
            }
        }
    }

    if pending.is_open() {
        parsed
            .diagnostics
            .push(ParseDiagnostic::new(pending.line, "directive without a stream URL"));
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "http://host/dir/list.m3u8";

    fn seen() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_hash_url() {
        let hash = hash_url("http://example.com/playlist.m3u");
        assert!(!hash.is_empty());
        assert_eq!(hash.len(), 40); // SHA1 produces 40 hex chars
    }

    #[test]
    fn test_parse_extinf() {
        let line = r#"#EXTINF:-1 tvg-id="globo" tvg-name="Globo HD" tvg-logo="http://logo.com/globo.png" group-title="TV",Globo HD"#;
        let extinf = parse_extinf(line).unwrap();

        assert_eq!(extinf.title, "Globo HD");
        assert_eq!(extinf.attr("tvg-id"), Some("globo"));
        assert_eq!(extinf.attr("group-title"), Some("TV"));
    }

    #[test]
    fn test_parse_extinf_minimal() {
        let extinf = parse_extinf("#EXTINF:-1,Canal Teste").unwrap();

        assert_eq!(extinf.title, "Canal Teste");
        assert!(extinf.attributes.is_empty());
    }

    #[test]
    fn test_parse_extinf_comma_inside_attribute() {
        let extinf = parse_extinf(r#"#EXTINF:-1 group-title="News, Sports",CNN"#).unwrap();
        assert_eq!(extinf.attr("group-title"), Some("News, Sports"));
        assert_eq!(extinf.title, "CNN");
    }

    #[test]
    fn test_parse_extinf_malformed() {
        assert!(parse_extinf("#EXTINF:-1 tvg-id=\"x\"").is_err());
        assert!(parse_extinf("#EXTINF:-1 tvg-id=\"x").is_err());
    }

    #[test]
    fn test_resolve_local_path() {
        assert_eq!(
            resolve_playback_url("file:///sub/chan.ts", PLAYLIST).as_deref(),
            Some("http://host/dir/sub/chan.ts")
        );
    }

    #[test]
    fn test_resolve_local_path_drops_playlist_query() {
        assert_eq!(
            resolve_playback_url("file:///a.ts", "https://host:8443/x/y/get.php?u=1").as_deref(),
            Some("https://host:8443/x/y/a.ts")
        );
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        assert_eq!(
            resolve_playback_url("chan.ts", PLAYLIST).as_deref(),
            Some("http://host/dir/chan.ts")
        );
        assert_eq!(
            resolve_playback_url("rtmp://cdn/live", PLAYLIST).as_deref(),
            Some("rtmp://cdn/live")
        );
        assert_eq!(resolve_playback_url("   ", PLAYLIST), None);
    }

    #[test]
    fn test_parse_full_playlist() {
        let content = "\u{feff}#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"bbc1\" tvg-logo=\"http://logo/bbc1.png\" group-title=\"UK\",BBC  One\n\
            http://stream/bbc1.m3u8\n\
            \n\
            #EXTINF:-1 group-title=\"Local\",Local News\n\
            file:///sub/chan.ts\n";
        let parsed = parse_m3u(content, PLAYLIST, seen());

        assert!(parsed.diagnostics.is_empty());
        assert_eq!(parsed.channels.len(), 2);

        let bbc = &parsed.channels[0];
        assert_eq!(bbc.id, "bbc1");
        assert_eq!(bbc.epg_id.as_deref(), Some("bbc1"));
        assert_eq!(bbc.name, "BBC One");
        assert_eq!(bbc.logo.as_deref(), Some("http://logo/bbc1.png"));
        assert_eq!(bbc.category, "UK");
        assert_eq!(bbc.playlist_url, PLAYLIST);
        assert_eq!(bbc.last_seen, seen());

        let local = &parsed.channels[1];
        assert_eq!(local.url, "http://host/dir/sub/chan.ts");
        assert_eq!(local.id, hash_url("http://host/dir/sub/chan.ts"));
        assert_eq!(local.epg_id, None);
    }

    #[test]
    fn test_malformed_directive_is_skipped() {
        let content = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"broken\n\
            http://stream/broken.ts\n\
            #EXTINF:-1 tvg-id=\"ok\",Fine\n\
            http://stream/ok.ts\n";
        let parsed = parse_m3u(content, PLAYLIST, seen());

        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].id, "ok");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].line, 2);
    }

    #[test]
    fn test_kodiprop_drm_and_extgrp() {
        let content = "#EXTM3U\n\
            #KODIPROP:inputstream.adaptive.license_type=clearkey\n\
            #KODIPROP:inputstream.adaptive.license_key=abc:def\n\
            #EXTINF:-1 tvg-id=\"drm\",Protected\n\
            #EXTGRP:Premium\n\
            http://stream/drm.mpd\n\
            #EXTINF:-1 tvg-id=\"plain\",Plain\n\
            http://stream/plain.ts\n";
        let parsed = parse_m3u(content, PLAYLIST, seen());

        let drm = parsed.channels[0].drm.as_ref().unwrap();
        assert_eq!(drm.license_type, "clearkey");
        assert_eq!(drm.license_key, "abc:def");
        assert_eq!(parsed.channels[0].category, "Premium");
        assert!(parsed.channels[1].drm.is_none());
        assert_eq!(parsed.channels[1].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_bare_url_and_dangling_directive() {
        let content = "http://stream/a/plain.ts\n\
            some garbage\n\
            #EXTINF:-1,Orphan\n";
        let parsed = parse_m3u(content, PLAYLIST, seen());

        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].name, "plain.ts");
        assert_eq!(parsed.diagnostics.len(), 2);
    }

    #[test]
    fn test_title_falls_back_to_tvg_name() {
        let content = "#EXTINF:-1 tvg-name=\"Named\",\nhttp://stream/x.ts\n";
        let parsed = parse_m3u(content, PLAYLIST, seen());
        assert_eq!(parsed.channels[0].name, "Named");
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse_m3u("", PLAYLIST, seen());
        assert!(parsed.channels.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }
}
