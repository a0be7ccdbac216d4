//! Xtream Codes Integration
//!
//! Panel-style IPTV providers expose their catalogue through the Player API v2:
//!
//! ```text
//! http://server:port/player_api.php?username=X&password=Y&action=get_live_streams
//! ```
//!
//! - **Client**: fetches category/stream listings and series details
//! - **Parser**: joins listings into channel records, series info into episodes
//! - **Types**: lenient response types and URL templates

pub mod client;
pub mod parser;
pub mod types;

// Re-exports for convenience
pub use client::XtreamClient;
pub use parser::{parse_series_info, parse_xtream};
pub use types::{redact_password, XtreamCredentials};
