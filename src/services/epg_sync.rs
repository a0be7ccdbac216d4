//! EPG sync
//!
//! Keyed by EPG source URL, independent of playlist passes. A stored guide
//! stays valid until its latest programme has ended; fetching is skipped
//! while it is valid unless forced.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::db::Store;
use crate::error::{IngestError, ParseError};
use crate::models::{ProgrammeRecord, SyncStatus};
use crate::services::clock::Clock;
use crate::services::epg_parser::parse_xmltv;
use crate::services::fetcher::Fetcher;
use crate::services::flight::{Join, SyncRegistry};
use crate::services::metrics::{self, InFlightGuard, PassKind};
use crate::services::xtream::redact_password;

/// Merge a fetched guide into the stored one
///
/// Fetched programmes win. A stored programme survives only when it overlaps
/// no fetched programme of its channel and ended after `now - retention`.
/// Overlaps inside the fetch keep the earlier-starting programme. Output is
/// sorted by channel, then start.
pub fn merge_programmes(
    stale: Vec<ProgrammeRecord>,
    fetched: Vec<ProgrammeRecord>,
    now: DateTime<Utc>,
    retention: Duration,
) -> Vec<ProgrammeRecord> {
    let cutoff = now - retention;

    let mut by_channel: HashMap<String, Vec<ProgrammeRecord>> = HashMap::new();
    for programme in fetched {
        by_channel
            .entry(programme.channel_id.clone())
            .or_default()
            .push(programme);
    }
    for list in by_channel.values_mut() {
        list.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        let mut kept: Vec<ProgrammeRecord> = Vec::with_capacity(list.len());
        for programme in list.drain(..) {
            if kept.last().is_some_and(|last| last.overlaps(&programme)) {
                continue;
            }
            kept.push(programme);
        }
        *list = kept;
    }

    let mut carried = Vec::new();
    for programme in stale {
        if programme.end <= cutoff {
            continue;
        }
        let clashes = by_channel
            .get(&programme.channel_id)
            .is_some_and(|list| list.iter().any(|p| p.overlaps(&programme)));
        if !clashes {
            carried.push(programme);
        }
    }

    let mut merged: Vec<ProgrammeRecord> = by_channel.into_values().flatten().collect();
    merged.extend(carried);
    merged.sort_by(|a, b| {
        a.channel_id
            .cmp(&b.channel_id)
            .then(a.start.cmp(&b.start))
    });
    merged
}

pub struct EpgSync {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    registry: Arc<SyncRegistry<usize>>,
    retention: Duration,
}

impl EpgSync {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        retention_hours: i64,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            registry: SyncRegistry::new(),
            retention: Duration::hours(retention_hours.max(0)),
        }
    }

    /// True while the stored guide still covers the current time
    pub async fn is_valid(&self, epg_url: &str) -> Result<bool, IngestError> {
        let latest = self.store.latest_programme_end(epg_url).await?;
        Ok(latest.is_some_and(|end| end > self.clock.now()))
    }

    /// Refresh one EPG source; returns the stored programme count
    ///
    /// A valid guide is left alone unless `force` is set.
    pub async fn fetch(&self, epg_url: &str, force: bool) -> Result<usize, IngestError> {
        if !force && self.is_valid(epg_url).await? {
            debug!("EPG {} still valid, skipping", redact_password(epg_url));
            return Ok(self.store.programmes(epg_url).await?.len());
        }

        let guard = match self.registry.join(epg_url, self.clock.now()) {
            Join::Leader(guard) => guard,
            Join::Follower(waiter) => return waiter.wait().await,
        };

        let _in_flight = InFlightGuard::enter();
        let token = guard.token().clone();
        let span = tracing::info_span!(
            "epg",
            pass = %uuid::Uuid::new_v4(),
            url = %redact_password(epg_url)
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(IngestError::Cancelled),
            result = self.run_pass(epg_url).instrument(span) => result,
        };

        match &outcome {
            Ok(_) => metrics::record_pass(PassKind::Epg, "success"),
            Err(IngestError::Cancelled) => metrics::record_pass(PassKind::Epg, "cancelled"),
            Err(e) => {
                warn!(
                    "EPG sync of {} failed: {}",
                    redact_password(epg_url),
                    redact_password(&e.to_string())
                );
                metrics::record_pass(PassKind::Epg, "failure");
            }
        }

        guard.finish(outcome, Some(self.clock.now()))
    }

    async fn run_pass(&self, epg_url: &str) -> Result<usize, IngestError> {
        info!("EPG sync started");
        let bytes = self.fetcher.fetch(epg_url, None).await?;

        let url = epg_url.to_string();
        let guide = tokio::task::spawn_blocking(move || parse_xmltv(&bytes, &url))
            .await
            .map_err(|e| ParseError::Malformed(format!("parser task failed: {}", e)))??;

        if !guide.diagnostics.is_empty() {
            warn!(
                "Skipped {} programmes (first at {}: {})",
                guide.diagnostics.len(),
                guide.diagnostics[0].line,
                guide.diagnostics[0].message
            );
        }

        let stale = self.store.programmes(epg_url).await?;
        let merged = merge_programmes(stale, guide.programmes, self.clock.now(), self.retention);
        self.store.replace_programmes(epg_url, &merged).await?;

        info!("EPG sync finished: {} programmes", merged.len());
        Ok(merged.len())
    }

    pub fn cancel(&self, epg_url: &str) -> bool {
        self.registry.cancel(epg_url)
    }

    pub fn status(&self, epg_url: &str) -> SyncStatus {
        self.registry.status(epg_url).unwrap_or_default()
    }

    pub fn forget(&self, epg_url: &str) {
        self.registry.forget(epg_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(hour * 3600, 0).unwrap()
    }

    fn programme(channel: &str, start: i64, end: i64, title: &str) -> ProgrammeRecord {
        ProgrammeRecord {
            epg_url: "http://epg/guide.xml".to_string(),
            channel_id: channel.to_string(),
            start: at(start),
            end: at(end),
            title: title.to_string(),
            description: None,
            icon: None,
        }
    }

    fn titles(list: &[ProgrammeRecord]) -> Vec<&str> {
        list.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn test_fetched_replaces_overlapping_stale() {
        let merged = merge_programmes(
            vec![programme("a", 100, 102, "old")],
            vec![programme("a", 101, 103, "new")],
            at(100),
            Duration::hours(24),
        );
        assert_eq!(titles(&merged), vec!["new"]);
    }

    #[test]
    fn test_keeps_recent_non_overlapping_stale() {
        let merged = merge_programmes(
            vec![
                programme("a", 90, 91, "expired"),
                programme("a", 99, 100, "recent"),
                programme("b", 101, 102, "other channel"),
            ],
            vec![programme("a", 100, 101, "fresh")],
            at(100),
            Duration::hours(5),
        );
        assert_eq!(titles(&merged), vec!["recent", "fresh", "other channel"]);
    }

    #[test]
    fn test_output_sorted_and_non_overlapping() {
        let merged = merge_programmes(
            Vec::new(),
            vec![
                programme("a", 102, 103, "third"),
                programme("a", 100, 102, "first"),
                programme("a", 101, 102, "clash"),
            ],
            at(100),
            Duration::hours(1),
        );
        assert_eq!(titles(&merged), vec!["first", "third"]);
        assert!(merged.windows(2).all(|w| w[0].end <= w[1].start));
    }
}
