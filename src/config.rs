use std::env;

/// Which store implementation backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Storage
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub db_max_connections: u32,

    // Fetching
    pub fetch_timeout_ms: u64,
    pub max_playlist_size_mb: usize,
    pub user_agent: String,
    /// Accept `file://` playlist and EPG sources from API callers
    pub allow_file_sources: bool,

    // Scheduling
    pub sync_interval_secs: u64,
    pub playlist_refresh_minutes: i64,
    pub epg_retention_hours: i64,
}

fn var_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };

        Self {
            // Server
            port: var_or("PORT", 3001),

            // Storage
            store_backend,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/iptv_hub".to_string()),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 15),

            // Fetching
            fetch_timeout_ms: var_or("FETCH_TIMEOUT_MS", 60_000), // 1 minute
            max_playlist_size_mb: var_or("MAX_PLAYLIST_SIZE_MB", 200),
            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
            allow_file_sources: var_or("ALLOW_FILE_SOURCES", false),

            // Scheduling
            sync_interval_secs: var_or("SYNC_INTERVAL_SECS", 900), // 15 minutes
            playlist_refresh_minutes: var_or("PLAYLIST_REFRESH_MINUTES", 360), // 6 hours
            epg_retention_hours: var_or("EPG_RETENTION_HOURS", 24),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
