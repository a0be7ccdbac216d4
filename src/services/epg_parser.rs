//! XMLTV guide parser
//!
//! Reads `<programme channel="..." start="..." stop="...">` elements with their
//! `title`, `desc` and `icon` children. Channel ids are kept as-is; matching
//! them against channels happens when programmes are queried. Gzip-compressed
//! guides (`.xml.gz`) are inflated first.

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;
use std::io::Read;

use crate::error::ParseError;
use crate::models::ProgrammeRecord;
use crate::services::playlist_parser::{decode_text, ParseDiagnostic};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Default)]
pub struct ParsedGuide {
    pub programmes: Vec<ProgrammeRecord>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Programme,
    Title,
    Desc,
}

/// Programme being assembled; times stay raw until the element closes
struct PendingProgramme {
    channel: Option<String>,
    start: Option<String>,
    stop: Option<String>,
    title: String,
    description: String,
    icon: Option<String>,
    position: usize,
}

fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(Cow::into_owned))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an XMLTV timestamp (`YYYYMMDDhhmmss +hhmm`); no offset means UTC
pub fn parse_xmltv_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    for format in ["%Y%m%d%H%M%S %z", "%Y%m%d%H%M%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let digits = raw.get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Inflate gzip content, pass anything else through
fn inflate(bytes: &[u8]) -> Result<Cow<'_, [u8]>, ParseError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(bytes));
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Malformed(format!("gzip: {}", e)))?;
    Ok(Cow::Owned(out))
}

/// Parse an XMLTV document fetched from `epg_url`
pub fn parse_xmltv(bytes: &[u8], epg_url: &str) -> Result<ParsedGuide, ParseError> {
    let bytes = inflate(bytes)?;
    let text = decode_text(&bytes)?;

    let mut guide = ParsedGuide::default();
    if text.trim().is_empty() {
        return Ok(guide);
    }

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut state = ParserState::Root;
    let mut current: Option<PendingProgramme> = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            ParseError::Malformed(format!("XML error at byte {}: {}", position, e))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"programme" => {
                        let pending = PendingProgramme {
                            channel: get_attribute(e, b"channel"),
                            start: get_attribute(e, b"start"),
                            stop: get_attribute(e, b"stop"),
                            title: String::new(),
                            description: String::new(),
                            icon: None,
                            position,
                        };
                        if is_empty {
                            finish(pending, epg_url, &mut guide);
                        } else {
                            current = Some(pending);
                            state = ParserState::Programme;
                        }
                    }
                    b"title" if state == ParserState::Programme && !is_empty => {
                        state = ParserState::Title;
                    }
                    b"desc" if state == ParserState::Programme && !is_empty => {
                        state = ParserState::Desc;
                    }
                    b"icon" if state == ParserState::Programme => {
                        if let Some(ref mut p) = current {
                            p.icon = get_attribute(e, b"src");
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(e).into_owned());
                if let Some(ref mut p) = current {
                    match state {
                        ParserState::Title => p.title.push_str(&text),
                        ParserState::Desc => p.description.push_str(&text),
                        _ => {}
                    }
                }
            }
            Event::CData(ref e) => {
                let text = String::from_utf8_lossy(e);
                if let Some(ref mut p) = current {
                    match state {
                        ParserState::Title => p.title.push_str(&text),
                        ParserState::Desc => p.description.push_str(&text),
                        _ => {}
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"programme" => {
                    if let Some(pending) = current.take() {
                        finish(pending, epg_url, &mut guide);
                    }
                    state = ParserState::Root;
                }
                b"title" | b"desc" if current.is_some() => state = ParserState::Programme,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(guide)
}

/// Validate a closed programme element and append it
fn finish(pending: PendingProgramme, epg_url: &str, guide: &mut ParsedGuide) {
    let reject = |guide: &mut ParsedGuide, reason: &str| {
        tracing::warn!("Skipping programme at byte {}: {}", pending.position, reason);
        guide
            .diagnostics
            .push(ParseDiagnostic::new(pending.position, reason));
    };

    let Some(channel_id) = pending.channel.clone() else {
        return reject(guide, "missing channel attribute");
    };
    let start = pending.start.as_deref().and_then(parse_xmltv_time);
    let end = pending.stop.as_deref().and_then(parse_xmltv_time);
    let (Some(start), Some(end)) = (start, end) else {
        return reject(guide, "unparsable start or stop time");
    };
    if end <= start {
        return reject(guide, "stop is not after start");
    }

    let description = pending.description.trim();
    guide.programmes.push(ProgrammeRecord {
        epg_url: epg_url.to_string(),
        channel_id,
        start,
        end,
        title: pending.title.trim().to_string(),
        description: (!description.is_empty()).then(|| description.to_string()),
        icon: pending.icon.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const EPG: &str = "http://host/epg.xml";

    const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="bbc1"><display-name>BBC One</display-name></channel>
  <programme channel="bbc1" start="20240101120000 +0100" stop="20240101130000 +0100">
    <title lang="en">News &amp; Weather</title>
    <desc>Headlines</desc>
    <icon src="http://img/news.png"/>
  </programme>
  <programme channel="unknown.channel" start="20240101130000" stop="20240101140000">
    <title><![CDATA[Late Show]]></title>
  </programme>
  <programme channel="bbc1" start="garbage" stop="20240101140000 +0000">
    <title>Broken</title>
  </programme>
  <programme channel="bbc1" start="20240101150000 +0000" stop="20240101140000 +0000">
    <title>Backwards</title>
  </programme>
</tv>"#;

    #[test]
    fn test_parse_xmltv_time() {
        let with_offset = parse_xmltv_time("20240101120000 +0100").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2024-01-01T11:00:00+00:00");

        let compact = parse_xmltv_time("20240101120000-0200").unwrap();
        assert_eq!(compact.to_rfc3339(), "2024-01-01T14:00:00+00:00");

        let bare = parse_xmltv_time("20240101120000").unwrap();
        assert_eq!(bare.to_rfc3339(), "2024-01-01T12:00:00+00:00");

        assert!(parse_xmltv_time("2024").is_none());
    }

    #[test]
    fn test_parse_guide() {
        let guide = parse_xmltv(GUIDE.as_bytes(), EPG).unwrap();

        assert_eq!(guide.programmes.len(), 2);
        assert_eq!(guide.diagnostics.len(), 2);

        let news = &guide.programmes[0];
        assert_eq!(news.channel_id, "bbc1");
        assert_eq!(news.title, "News & Weather");
        assert_eq!(news.description.as_deref(), Some("Headlines"));
        assert_eq!(news.icon.as_deref(), Some("http://img/news.png"));
        assert_eq!(news.epg_url, EPG);
        assert_eq!(news.start.to_rfc3339(), "2024-01-01T11:00:00+00:00");

        // Unknown channels are kept
        let late = &guide.programmes[1];
        assert_eq!(late.channel_id, "unknown.channel");
        assert_eq!(late.title, "Late Show");
        assert_eq!(late.description, None);
    }

    #[test]
    fn test_gzip_guide() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(GUIDE.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let guide = parse_xmltv(&compressed, EPG).unwrap();
        assert_eq!(guide.programmes.len(), 2);
    }

    #[test]
    fn test_malformed_xml() {
        let result = parse_xmltv(b"<tv><programme channel=\"a\"></tv>", EPG);
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_empty_and_non_text() {
        assert!(parse_xmltv(b"", EPG).unwrap().programmes.is_empty());
        assert!(matches!(
            parse_xmltv(&[0x3c, 0xff, 0xfe], EPG),
            Err(ParseError::Encoding(_))
        ));
    }
}
