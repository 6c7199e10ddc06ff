//! Live client for osu-web pages and the osu! v1 API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use phillip_core::model::OSU_BASE_URL;
use phillip_core::{
    Actor, ActorQuery, FeedFilter, GroupId, RawRecord, RosterEntry, WorkId, WorkMetadata,
};
use reqwest::header::COOKIE;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::page::embedded_json;
use crate::payload::{self, ApiBeatmap, ApiUser, DiscussionPage, WebEvent};
use crate::{FeedSource, SyncError};

/// Connection settings for [`OsuClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// v1 API key, sent as `k`.
    pub api_key: String,
    /// Minimum spacing between page requests. API calls are not throttled.
    pub request_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: OSU_BASE_URL.to_string(),
            api_key: String::new(),
            request_interval: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_interval", &self.request_interval)
            .finish()
    }
}

type PageLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Reads the review feed from osu-web and looks works and users up through
/// the v1 API.
pub struct OsuClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// `None` when `request_interval` is zero.
    page_limiter: Option<PageLimiter>,
}

impl OsuClient {
    /// `base_url` should be like `https://osu.ppy.sh`; a trailing slash is dropped.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            page_limiter: Quota::with_period(config.request_interval).map(PageLimiter::direct),
        }
    }

    fn events_url(&self, filter: &FeedFilter) -> String {
        let types: Vec<String> = filter
            .kinds()
            .iter()
            .map(|k| format!("types%5B%5D={k}"))
            .collect();
        format!("{}/beatmapsets/events?{}", self.base_url, types.join("&"))
    }

    /// Page requests are spaced by `request_interval`; the first one goes
    /// out immediately.
    async fn get_page(&self, url: &str) -> Result<String, SyncError> {
        if let Some(limiter) = &self.page_limiter {
            if limiter.check().is_err() {
                debug!(url = %url, "throttling page request");
                limiter.until_ready().await;
            }
        }

        info!(url = %url, "fetching page");
        let resp = self
            .client
            .get(url)
            .header(COOKIE, "locale=en")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.text().await?)
    }

    async fn get_embedded<T: DeserializeOwned>(
        &self,
        url: &str,
        tag: &str,
    ) -> Result<T, SyncError> {
        let html = self.get_page(url).await?;
        let json = embedded_json(&html, tag)?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn get_api<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let url = format!("{}/api/{endpoint}", self.base_url);
        debug!(url = %url, "calling v1 api");
        let resp = self
            .client
            .get(&url)
            .query(&[("k", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl FeedSource for OsuClient {
    async fn fetch_feed_batch(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, SyncError> {
        let url = self.events_url(filter);
        let events: Vec<WebEvent> = self.get_embedded(&url, "json-events").await?;
        let records = events
            .into_iter()
            .map(|e| e.into_record(None))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = records.len(), "fetched feed batch");
        Ok(records)
    }

    async fn fetch_work_metadata(&self, work_id: WorkId) -> Result<WorkMetadata, SyncError> {
        let rows: Vec<ApiBeatmap> = self
            .get_api("get_beatmaps", &[("s", work_id.to_string())])
            .await?;
        payload::metadata_from_rows(work_id, rows)
    }

    async fn fetch_actor(&self, query: ActorQuery) -> Result<Actor, SyncError> {
        let kind = match query {
            ActorQuery::Id(_) => "id",
            ActorQuery::Name(_) => "string",
        };
        let users: Vec<ApiUser> = self
            .get_api("get_user", &[("u", query.to_string()), ("type", kind.to_string())])
            .await?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::NotFound(format!("user {query}")))?
            .try_into()
    }

    async fn fetch_work_history(&self, work_id: WorkId) -> Result<Vec<RawRecord>, SyncError> {
        let url = format!("{}/beatmapsets/{work_id}/discussion", self.base_url);
        let page: DiscussionPage = self
            .get_embedded(&url, "json-beatmapset-discussion")
            .await?;
        page.beatmapset
            .events
            .into_iter()
            .map(|e| e.into_record(Some(work_id)))
            .collect()
    }

    async fn fetch_group_roster(&self, group: GroupId) -> Result<Vec<RosterEntry>, SyncError> {
        let url = format!("{}/groups/{group}", self.base_url);
        let html = self.get_page(&url).await?;
        let members = payload::roster_from_json(&embedded_json(&html, "json-users")?)?;
        info!(group, count = members.len(), "fetched group roster");
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> OsuClient {
        OsuClient::new(ClientConfig {
            base_url: base.into(),
            api_key: "secret".into(),
            request_interval: Duration::from_millis(10),
        })
    }

    #[test]
    fn trailing_slash_trimmed() {
        assert_eq!(client("https://osu.ppy.sh/").base_url, "https://osu.ppy.sh");
    }

    #[test]
    fn events_url_lists_enabled_kinds() {
        let filter = FeedFilter {
            love: false,
            nomination_reset: false,
            disqualify: false,
            ..FeedFilter::default()
        };
        assert_eq!(
            client("https://osu.ppy.sh").events_url(&filter),
            "https://osu.ppy.sh/beatmapsets/events?types%5B%5D=nominate&types%5B%5D=rank&types%5B%5D=qualify"
        );
    }

    #[test]
    fn zero_interval_disables_page_limiter() {
        let unlimited = OsuClient::new(ClientConfig {
            request_interval: Duration::ZERO,
            ..ClientConfig::default()
        });
        assert!(unlimited.page_limiter.is_none());
    }

    #[test]
    fn page_limiter_allows_one_request_per_interval() {
        let c = OsuClient::new(ClientConfig {
            request_interval: Duration::from_secs(30),
            ..ClientConfig::default()
        });
        let limiter = c.page_limiter.as_ref().unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn debug_hides_api_key() {
        let config = ClientConfig {
            api_key: "secret".into(),
            ..ClientConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("osu.ppy.sh"));
    }

    #[tokio::test]
    async fn unreachable_host_is_http_error() {
        let c = client("http://127.0.0.1:1");
        let err = c.fetch_work_metadata(WorkId(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Http(_)));
    }
}
