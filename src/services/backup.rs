//! Backup codec
//!
//! Encodes the subscription set (playlists, category flags, channel flags)
//! as a versioned JSON document. Export is deterministic: blocks are ordered
//! by playlist URL, entries by category name or channel id.

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::models::backup::{CategoryFlagEntry, ChannelFlagEntry, BACKUP_VERSION};
use crate::models::{
    BackupDocument, CategoryFlagRecord, ChannelFlagRecord, PlaylistBackup, PlaylistRecord,
};
use crate::services::playlist_parser::decode_text;

/// Build the document for the given state
///
/// Flags of unknown playlists are ignored. Channel entries with no flag set
/// are left out.
pub fn export(
    playlists: &[PlaylistRecord],
    category_flags: &[CategoryFlagRecord],
    channel_flags: &[ChannelFlagRecord],
) -> BackupDocument {
    let mut blocks: BTreeMap<&str, PlaylistBackup> = playlists
        .iter()
        .map(|p| {
            let mut epg_urls = p.epg_urls.clone();
            epg_urls.sort();
            epg_urls.dedup();
            (
                p.url.as_str(),
                PlaylistBackup {
                    url: p.url.clone(),
                    title: p.title.clone(),
                    kind: p.kind,
                    credentials: p.credentials.clone(),
                    user_agent: p.user_agent.clone(),
                    epg_urls,
                    categories: Vec::new(),
                    channels: Vec::new(),
                },
            )
        })
        .collect();

    for record in category_flags {
        if let Some(block) = blocks.get_mut(record.playlist_url.as_str()) {
            block.categories.push(CategoryFlagEntry {
                category: record.category.clone(),
                flags: record.flags,
            });
        }
    }
    for record in channel_flags.iter().filter(|r| !r.flags.is_default()) {
        if let Some(block) = blocks.get_mut(record.playlist_url.as_str()) {
            block.channels.push(ChannelFlagEntry {
                id: record.channel_id.clone(),
                flags: record.flags,
            });
        }
    }

    let playlists = blocks
        .into_values()
        .map(|mut block| {
            block.categories.sort_by(|a, b| a.category.cmp(&b.category));
            block.categories.dedup_by(|a, b| a.category == b.category);
            block.channels.sort_by(|a, b| a.id.cmp(&b.id));
            block.channels.dedup_by(|a, b| a.id == b.id);
            block
        })
        .collect();

    BackupDocument {
        version: BACKUP_VERSION,
        playlists,
    }
}

pub fn encode(document: &BackupDocument) -> Vec<u8> {
    // Serializing plain structs with string keys cannot fail
    serde_json::to_vec_pretty(document).unwrap_or_default()
}

pub fn decode(bytes: &[u8]) -> Result<BackupDocument, ParseError> {
    let text = decode_text(bytes)?;
    let document: BackupDocument = serde_json::from_str(text)
        .map_err(|e| ParseError::Malformed(format!("backup document: {}", e)))?;
    validate(&document)?;
    Ok(document)
}

/// Checks shared by decoding and documents received already deserialized
pub fn validate(document: &BackupDocument) -> Result<(), ParseError> {
    if document.version != BACKUP_VERSION {
        return Err(ParseError::Malformed(format!(
            "unsupported backup version {}",
            document.version
        )));
    }
    for block in &document.playlists {
        if block.url.trim().is_empty() {
            return Err(ParseError::Malformed("playlist block without url".to_string()));
        }
        if block.kind.is_xtream() && block.credentials.is_none() {
            return Err(ParseError::Malformed(format!(
                "{} playlist {} has no credentials",
                block.kind, block.url
            )));
        }
    }
    Ok(())
}
