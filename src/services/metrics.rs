//! Prometheus metrics for sync passes
//!
//! Registered in the default registry, served by `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, register_int_gauge};
use prometheus::{IntCounter, IntCounterVec, IntGauge};

lazy_static! {
    /// Finished passes by kind (`playlist` | `epg`) and outcome
    pub static ref SYNC_PASSES: IntCounterVec = register_int_counter_vec!(
        "iptv_sync_passes_total",
        "Sync passes by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap();

    pub static ref CHANNELS_COMMITTED: IntCounter = register_int_counter!(
        "iptv_channels_committed_total",
        "Channels written by successful playlist syncs"
    )
    .unwrap();

    pub static ref SYNCS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "iptv_syncs_in_flight",
        "Sync passes currently running"
    )
    .unwrap();
}

/// Kind label of a pass
#[derive(Debug, Clone, Copy)]
pub enum PassKind {
    Playlist,
    Epg,
}

impl PassKind {
    fn label(self) -> &'static str {
        match self {
            PassKind::Playlist => "playlist",
            PassKind::Epg => "epg",
        }
    }
}

pub fn record_pass(kind: PassKind, outcome: &str) {
    SYNC_PASSES.with_label_values(&[kind.label(), outcome]).inc();
}

/// Keeps `iptv_syncs_in_flight` raised while alive
pub struct InFlightGuard;

impl InFlightGuard {
    pub fn enter() -> Self {
        SYNCS_IN_FLIGHT.inc();
        InFlightGuard
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        SYNCS_IN_FLIGHT.dec();
    }
}
