//! Xtream Codes API Client
//!
//! Issues Player API v2 requests through the engine's [`Fetcher`], so panel
//! traffic gets the same user agent, timeout and size limit as playlists.

use super::types::*;
use tracing::debug;

use crate::error::FetchError;
use crate::models::SourceKind;
use crate::services::fetcher::Fetcher;
use crate::services::playlist_parser::SourceContent;

/// Xtream API Client bound to one set of credentials
pub struct XtreamClient<'a> {
    fetcher: &'a dyn Fetcher,
    creds: &'a XtreamCredentials,
    user_agent: Option<&'a str>,
}

impl<'a> XtreamClient<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        creds: &'a XtreamCredentials,
        user_agent: Option<&'a str>,
    ) -> Self {
        Self {
            fetcher,
            creds,
            user_agent,
        }
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Xtream API request: {}", redact_password(url));
        self.fetcher.fetch(url, self.user_agent).await
    }

    /// Fetch the category and stream listings of one kind concurrently
    pub async fn get_listing(&self, kind: SourceKind) -> Result<SourceContent, FetchError> {
        let categories_url = self.creds.categories_url(kind);
        let streams_url = self.creds.playlist_url(kind);

        let (categories, streams) =
            futures::try_join!(self.get(&categories_url), self.get(&streams_url))?;

        Ok(SourceContent::Xtream {
            categories,
            streams,
        })
    }

    /// Get detailed series info with episodes
    pub async fn get_series_info(&self, series_id: &str) -> Result<Vec<u8>, FetchError> {
        self.get(&self.creds.series_info_url(series_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingFetcher {
        urls: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, url: &str, user_agent: Option<&str>) -> Result<Vec<u8>, FetchError> {
            self.urls
                .lock()
                .unwrap()
                .push((url.to_string(), user_agent.map(str::to_string)));
            if url.contains("categories") {
                Ok(b"[]".to_vec())
            } else {
                Ok(b"[{}]".to_vec())
            }
        }
    }

    #[tokio::test]
    async fn test_listing_fetches_both_endpoints() {
        let fetcher = RecordingFetcher {
            urls: Mutex::new(Vec::new()),
        };
        let creds = XtreamCredentials::new("http://panel", "u", "p");
        let client = XtreamClient::new(&fetcher, &creds, Some("Agent/1.0"));

        let content = client.get_listing(SourceKind::XtreamVod).await.unwrap();
        match content {
            SourceContent::Xtream { categories, streams } => {
                assert_eq!(categories, b"[]");
                assert_eq!(streams, b"[{}]");
            }
            other => panic!("unexpected content {:?}", other),
        }

        let urls = fetcher.urls.lock().unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().any(|(u, _)| u.ends_with("action=get_vod_categories")));
        assert!(urls.iter().all(|(_, ua)| ua.as_deref() == Some("Agent/1.0")));
    }
}
