//! Playlist sync coordinator
//!
//! One pass: fetch → parse → merge against the stored snapshot → commit.
//! Passes are single-flight per playlist URL and all-or-nothing: a failure
//! or cancellation at any step leaves the stored snapshot untouched.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use crate::db::{SnapshotCommit, Store};
use crate::error::{FetchError, IngestError, ParseError};
use crate::models::{ChannelFlags, ChannelRecord, PlaylistRecord, SourceKind, SyncStatus};
use crate::services::clock::Clock;
use crate::services::fetcher::Fetcher;
use crate::services::flight::{Join, SyncRegistry};
use crate::services::m3u_parser::hash_url;
use crate::services::metrics::{self, InFlightGuard, PassKind};
use crate::services::playlist_parser::{parse_playlist, SourceContent};
use crate::services::xtream::{redact_password, XtreamClient};

/// Progress callback, called with the running count of merged channels
pub type ProgressFn = Arc<dyn Fn(usize) + Send + Sync>;

// ============================================================================
// Merge
// ============================================================================

/// Merged channel set plus what the commit needs to know about it
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub channels: Vec<ChannelRecord>,
    /// Distinct categories in first-seen order
    pub categories: Vec<String>,
    /// Staged flag entries that were applied
    pub consumed_staged: Vec<String>,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Give repeated ids inside one fetch a stable suffix derived from the URL
fn unique_id(channel: &ChannelRecord, seen: &HashSet<String>) -> String {
    if !seen.contains(&channel.id) {
        return channel.id.clone();
    }
    let base = format!("{}#{}", channel.id, &hash_url(&channel.url)[..8]);
    let mut candidate = base.clone();
    let mut n = 2;
    while seen.contains(&candidate) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    candidate
}

/// Full replace by key, carrying user flags over
///
/// Channels already stored keep their flags; new ones take staged flags from
/// a restored backup when present, defaults otherwise. Stored channels absent
/// from `incoming` are dropped. `progress` sees every merged channel.
pub fn merge_channels(
    existing: &[ChannelRecord],
    incoming: Vec<ChannelRecord>,
    staged: &HashMap<String, ChannelFlags>,
    progress: &dyn Fn(usize),
) -> MergeOutcome {
    let stored: HashMap<&str, &ChannelRecord> =
        existing.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut outcome = MergeOutcome {
        channels: Vec::with_capacity(incoming.len()),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::with_capacity(incoming.len());
    let mut categories: HashSet<String> = HashSet::new();

    for mut channel in incoming {
        channel.id = unique_id(&channel, &seen);
        seen.insert(channel.id.clone());

        match stored.get(channel.id.as_str()) {
            Some(previous) => {
                channel.flags = previous.flags;
                if !previous.same_content(&channel) {
                    outcome.updated += 1;
                }
            }
            None => {
                channel.flags = match staged.get(&channel.id) {
                    Some(flags) => {
                        outcome.consumed_staged.push(channel.id.clone());
                        *flags
                    }
                    None => ChannelFlags::default(),
                };
                outcome.inserted += 1;
            }
        }

        if categories.insert(channel.category.clone()) {
            outcome.categories.push(channel.category.clone());
        }
        outcome.channels.push(channel);
        progress(outcome.channels.len());
    }

    outcome.removed = existing.iter().filter(|c| !seen.contains(&c.id)).count();
    outcome
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct SyncCoordinator {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    registry: Arc<SyncRegistry<usize>>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            fetcher,
            clock,
            registry: SyncRegistry::new(),
        }
    }

    /// Sync one playlist, or wait for the pass already running for it
    ///
    /// Returns the committed channel count. Waiting callers get the same
    /// outcome as the caller running the pass; only the latter sees progress.
    pub async fn sync(&self, url: &str, progress: Option<ProgressFn>) -> Result<usize, IngestError> {
        let guard = match self.registry.join(url, self.clock.now()) {
            Join::Leader(guard) => guard,
            Join::Follower(waiter) => {
                info!(
                    "Sync already running for {}, waiting for it",
                    redact_password(url)
                );
                return waiter.wait().await;
            }
        };

        let _in_flight = InFlightGuard::enter();
        let token = guard.token().clone();
        let span = tracing::info_span!(
            "sync",
            pass = %uuid::Uuid::new_v4(),
            url = %redact_password(url)
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(IngestError::Cancelled),
            result = self.run_pass(url, progress, &token).instrument(span) => result,
        };

        match &outcome {
            Ok(count) => {
                metrics::record_pass(PassKind::Playlist, "success");
                metrics::CHANNELS_COMMITTED.inc_by(*count as u64);
            }
            Err(IngestError::Cancelled) => metrics::record_pass(PassKind::Playlist, "cancelled"),
            Err(e) => {
                warn!(
                    "Sync of {} failed: {}",
                    redact_password(url),
                    redact_password(&e.to_string())
                );
                metrics::record_pass(PassKind::Playlist, "failure");
            }
        }

        guard.finish(outcome, Some(self.clock.now()))
    }

    async fn run_pass(
        &self,
        url: &str,
        progress: Option<ProgressFn>,
        token: &CancellationToken,
    ) -> Result<usize, IngestError> {
        let playlist = self
            .store
            .playlist(url)
            .await?
            .ok_or_else(|| IngestError::NotFound(url.to_string()))?;

        info!("Sync started ({})", playlist.kind);
        let content = self.fetch_content(&playlist).await?;

        // Parsing is CPU bound; keep it off the async workers
        let seen = self.clock.now();
        let parse_target = playlist.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            parse_playlist(&parse_target, &content, seen)
        })
        .await
        .map_err(|e| ParseError::Malformed(format!("parser task failed: {}", e)))??;

        if !parsed.diagnostics.is_empty() {
            warn!(
                "Skipped {} malformed entries (first at {}: {})",
                parsed.diagnostics.len(),
                parsed.diagnostics[0].line,
                parsed.diagnostics[0].message
            );
        }

        let existing = self.store.channels(url).await?;
        let staged = self.store.staged_flags(url).await?;
        let report = |count: usize| {
            if let Some(progress) = &progress {
                progress(count);
            }
        };
        let merged = merge_channels(&existing, parsed.channels, &staged, &report);

        if token.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let commit = SnapshotCommit {
            playlist_url: url.to_string(),
            channels: merged.channels,
            categories: merged.categories,
            consumed_staged: merged.consumed_staged,
            synced_at: self.clock.now(),
        };
        if !self.store.commit_snapshot(&commit).await? {
            return Err(IngestError::NotFound(url.to_string()));
        }

        info!(
            "Sync finished: {} channels ({} new, {} updated, {} removed)",
            commit.channels.len(),
            merged.inserted,
            merged.updated,
            merged.removed
        );
        Ok(commit.channels.len())
    }

    async fn fetch_content(&self, playlist: &PlaylistRecord) -> Result<SourceContent, FetchError> {
        let user_agent = playlist.user_agent.as_deref();
        match (&playlist.kind, &playlist.credentials) {
            (SourceKind::M3u, _) => {
                let bytes = self.fetcher.fetch(&playlist.url, user_agent).await?;
                Ok(SourceContent::M3u(bytes))
            }
            (kind, Some(creds)) => {
                XtreamClient::new(self.fetcher.as_ref(), creds, user_agent)
                    .get_listing(*kind)
                    .await
            }
            (kind, None) => Err(FetchError::Network(format!(
                "{} playlist {} has no credentials",
                kind, playlist.url
            ))),
        }
    }

    /// Cancel the running pass for `url`; `false` when none runs
    pub fn cancel(&self, url: &str) -> bool {
        self.registry.cancel(url)
    }

    pub fn is_refreshing(&self, url: &str) -> bool {
        self.registry.is_running(url)
    }

    /// State machine position of `url`, falling back to the stored sync time
    pub fn status(&self, url: &str, last_synced_at: Option<DateTime<Utc>>) -> SyncStatus {
        match self.registry.status(url) {
            Some(SyncStatus::Idle {
                last_synced_at: None,
                last_error,
            }) => SyncStatus::Idle {
                last_synced_at,
                last_error,
            },
            Some(status) => status,
            None => SyncStatus::Idle {
                last_synced_at,
                last_error: None,
            },
        }
    }

    pub fn forget(&self, url: &str) {
        self.registry.forget(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn channel(id: &str, name: &str, category: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            name: name.to_string(),
            logo: None,
            epg_id: None,
            category: category.to_string(),
            url: format!("http://host/{}.ts", name),
            drm: None,
            playlist_url: "http://host/list.m3u".to_string(),
            last_seen: DateTime::from_timestamp(0, 0).unwrap(),
            flags: ChannelFlags::default(),
        }
    }

    fn no_progress(_: usize) {}

    #[test]
    fn test_merge_carries_flags_over_renames() {
        let mut old = channel("a", "Old Name", "News");
        old.flags = ChannelFlags { favorite: true, muted: true };

        let merged = merge_channels(
            &[old],
            vec![channel("a", "New Name", "News")],
            &HashMap::new(),
            &no_progress,
        );

        assert_eq!(merged.channels[0].name, "New Name");
        assert_eq!(merged.channels[0].flags, ChannelFlags { favorite: true, muted: true });
        assert_eq!((merged.inserted, merged.updated, merged.removed), (0, 1, 0));
    }

    #[test]
    fn test_merge_removes_absent_and_defaults_new() {
        let mut gone = channel("gone", "Gone", "News");
        gone.flags.favorite = true;

        let merged = merge_channels(
            &[gone],
            vec![channel("fresh", "Fresh", "Sport")],
            &HashMap::new(),
            &no_progress,
        );

        assert_eq!(merged.channels.len(), 1);
        assert!(merged.channels[0].flags.is_default());
        assert_eq!((merged.inserted, merged.removed), (1, 1));
        assert_eq!(merged.categories, vec!["Sport"]);
    }

    #[test]
    fn test_merge_applies_staged_flags_to_new_channels() {
        let staged = HashMap::from([(
            "b".to_string(),
            ChannelFlags { favorite: false, muted: true },
        )]);
        let merged = merge_channels(
            &[],
            vec![channel("a", "A", "News"), channel("b", "B", "News")],
            &staged,
            &no_progress,
        );

        assert!(merged.channels[1].flags.muted);
        assert_eq!(merged.consumed_staged, vec!["b"]);
        assert_eq!(merged.categories, vec!["News"]);
    }

    #[test]
    fn test_merge_disambiguates_duplicate_ids() {
        let merged = merge_channels(
            &[],
            vec![channel("dup", "One", "X"), channel("dup", "Two", "X")],
            &HashMap::new(),
            &no_progress,
        );

        let expected = format!("dup#{}", &hash_url("http://host/Two.ts")[..8]);
        assert_eq!(merged.channels[0].id, "dup");
        assert_eq!(merged.channels[1].id, expected);
    }

    #[test]
    fn test_merge_progress_is_monotonic() {
        let counts = Mutex::new(Vec::new());
        let record = |n: usize| counts.lock().unwrap().push(n);
        merge_channels(
            &[],
            vec![channel("a", "A", "X"), channel("b", "B", "X"), channel("c", "C", "X")],
            &HashMap::new(),
            &record,
        );
        assert_eq!(*counts.lock().unwrap(), vec![1, 2, 3]);
    }
}
