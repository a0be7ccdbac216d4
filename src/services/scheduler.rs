//! Background refresh scheduler
//!
//! Runs as a background task on startup, then periodically.
//! - Refreshes playlists whose last successful sync is older than the
//!   configured age (or that never synced)
//! - Refreshes linked EPG sources whose guide has run out

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::config::Config;
use crate::services::clock::Clock;
use crate::services::engine::Engine;
use crate::services::xtream::redact_password;

/// Configuration for the refresh scheduler
pub struct SchedulerConfig {
    /// How often to look for stale sources (in seconds)
    pub interval_secs: u64,
    /// Age after which a playlist is refreshed
    pub playlist_refresh_minutes: i64,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval_secs: config.sync_interval_secs.max(1),
            playlist_refresh_minutes: config.playlist_refresh_minutes,
        }
    }
}

/// Result of one scheduler cycle
#[derive(Debug, Default)]
pub struct CycleResult {
    pub playlists_refreshed: usize,
    pub epg_sources_checked: usize,
    pub errors: Vec<String>,
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run a single refresh cycle
pub async fn run_cycle(engine: &Engine, clock: &dyn Clock, config: &SchedulerConfig) -> CycleResult {
    let mut result = CycleResult::default();
    let cutoff = clock.now() - ChronoDuration::minutes(config.playlist_refresh_minutes);

    let playlists = match engine.list_playlists().await {
        Ok(playlists) => playlists,
        Err(e) => {
            result.errors.push(format!("Listing playlists failed: {}", e));
            return result;
        }
    };

    // Refreshing ones are skipped; joining them would only wait
    for playlist in playlists.iter().filter(|p| !p.refreshing) {
        if playlist.last_synced_at.is_some_and(|at| at > cutoff) {
            continue;
        }
        match engine.refresh(&playlist.url).await {
            Ok(count) => {
                result.playlists_refreshed += 1;
                tracing::info!(
                    "Scheduler: refreshed {} ({} channels)",
                    redact_password(&playlist.url),
                    count
                );
            }
            Err(e) => result.errors.push(redact_password(&format!(
                "Refresh of {} failed: {}",
                playlist.url, e
            ))),
        }
    }

    let sources = match engine.epg_sources().await {
        Ok(sources) => sources,
        Err(e) => {
            result.errors.push(format!("Listing EPG sources failed: {}", e));
            return result;
        }
    };
    for epg_url in sources {
        result.epg_sources_checked += 1;
        if let Err(e) = engine.fetch_epg(&epg_url, false).await {
            result.errors.push(redact_password(&format!(
                "EPG refresh of {} failed: {}",
                epg_url, e
            )));
        }
    }

    result
}

/// Start the background refresh task
///
/// Runs immediately on startup, then periodically at the configured interval.
/// This should be spawned as a background task using `tokio::spawn`.
pub async fn start_scheduler_task(
    engine: Arc<Engine>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
) {
    tracing::info!(
        "Starting refresh scheduler (interval: {}s, playlist age: {}min)",
        config.interval_secs,
        config.playlist_refresh_minutes
    );

    // The first tick completes immediately
    let mut interval = time::interval(Duration::from_secs(config.interval_secs));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let result = run_cycle(&engine, clock.as_ref(), &config).await;
        if !result.is_success() {
            for error in &result.errors {
                tracing::warn!("Scheduler error: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::services::engine::tests::{harness, GUIDE, LIST, PLAYLIST};

    const XMLTV: &str = r#"<tv>
  <programme channel="news.1" start="20231114220000 +0000" stop="20231114230000 +0000">
    <title>Late News</title>
  </programme>
</tv>"#;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            interval_secs: 60,
            playlist_refresh_minutes: 60,
        }
    }

    #[tokio::test]
    async fn test_cycle_refreshes_only_stale_sources() {
        let h = harness();
        h.fetcher.serve(LIST, PLAYLIST);
        h.fetcher.serve(GUIDE, XMLTV);
        h.engine.subscribe_m3u("Home", LIST).await.unwrap();
        h.engine.link_epg(GUIDE, LIST).await.unwrap();

        // Fresh playlist, empty guide
        let result = run_cycle(&h.engine, h.clock.as_ref(), &config()).await;
        assert!(result.is_success());
        assert_eq!(result.playlists_refreshed, 0);
        assert_eq!(result.epg_sources_checked, 1);
        let calls = h.fetcher.calls();

        // Guide still valid, playlist not old enough yet
        h.clock.advance(ChronoDuration::minutes(30));
        run_cycle(&h.engine, h.clock.as_ref(), &config()).await;
        assert_eq!(h.fetcher.calls(), calls);

        h.clock.advance(ChronoDuration::minutes(31));
        let result = run_cycle(&h.engine, h.clock.as_ref(), &config()).await;
        assert_eq!(result.playlists_refreshed, 1);
        assert_eq!(h.fetcher.calls(), calls + 2);
    }

    #[tokio::test]
    async fn test_cycle_collects_errors() {
        let h = harness();
        h.fetcher.serve(LIST, PLAYLIST);
        h.engine.subscribe_m3u("Home", LIST).await.unwrap();
        h.engine.link_epg(GUIDE, LIST).await.unwrap();

        let result = run_cycle(&h.engine, h.clock.as_ref(), &config()).await;
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains(GUIDE));
    }

    #[tokio::test]
    async fn test_cycle_errors_mask_passwords() {
        let h = harness();
        let panel_list = "http://panel/get.php?username=u&password=S3cretPw&type=m3u_plus";
        h.fetcher.serve(panel_list, PLAYLIST);
        h.engine.subscribe_m3u("Panel", panel_list).await.unwrap();

        h.fetcher.fail(panel_list, FetchError::Status(401));
        h.clock.advance(ChronoDuration::minutes(61));
        let result = run_cycle(&h.engine, h.clock.as_ref(), &config()).await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("password=***&type=m3u_plus"));
        assert!(!result.errors[0].contains("S3cretPw"));
    }
}
