//! Ingestion services
//!
//! Parsers are pure; the sync passes, the engine facade and the scheduler
//! work against the [`crate::db::Store`] and [`fetcher::Fetcher`] traits.

pub mod backup;
pub mod category_state;
pub mod clock;
pub mod engine;
pub mod epg_parser;
pub mod epg_sync;
pub mod fetcher;
pub mod flight;
pub mod m3u_parser;
pub mod metrics;
pub mod playlist_parser;
pub mod scheduler;
pub mod sync;
pub mod xtream;
