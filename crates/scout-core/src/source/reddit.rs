//! Reddit adapter: translates (subreddit, sort, limit) into a single public
//! JSON endpoint call, grounded on `original_source/.../tools/reddit.py`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AdapterError;
use crate::source::{build_http_client, classify_status, Item, SourceAdapter};

/// The four sort orders the retry policy rotates through (spec §4.E.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedditSort {
    Hot,
    New,
    Top,
    Rising,
}

impl RedditSort {
    pub fn as_str(self) -> &'static str {
        match self {
            RedditSort::Hot => "hot",
            RedditSort::New => "new",
            RedditSort::Top => "top",
            RedditSort::Rising => "rising",
        }
    }

    pub fn parse(s: &str) -> Option<RedditSort> {
        match s {
            "hot" => Some(RedditSort::Hot),
            "new" => Some(RedditSort::New),
            "top" => Some(RedditSort::Top),
            "rising" => Some(RedditSort::Rising),
            _ => None,
        }
    }

    /// Rotates to the sort at `(index of self + attempt) mod 4`, matching
    /// the retry-perturbation table in spec §4.E.6.
    pub fn rotated(self, attempt: u32) -> RedditSort {
        const ORDER: [RedditSort; 4] = [
            RedditSort::Hot,
            RedditSort::New,
            RedditSort::Top,
            RedditSort::Rising,
        ];
        let current_index = ORDER.iter().position(|s| *s == self).unwrap_or(0);
        ORDER[(current_index + attempt as usize) % 4]
    }

    /// The goal-text hint appended on retry for this sort (spec §4.E.6).
    pub fn retry_hint(self) -> &'static str {
        match self {
            RedditSort::Hot => "focus on trending",
            RedditSort::New => "focus on most recent",
            RedditSort::Top => "focus on highest rated",
            RedditSort::Rising => "focus on gaining momentum",
        }
    }
}

/// `reddit` scout config: `{"subreddits": [name, ...], "reddit_sort": "hot"}` (spec §6).
#[derive(Debug, Deserialize)]
struct RedditConfig {
    subreddits: Vec<String>,
    #[serde(default)]
    reddit_sort: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    title: String,
    selftext: String,
    permalink: String,
    created_utc: f64,
}

pub struct RedditAdapter {
    client: reqwest::Client,
}

impl RedditAdapter {
    pub fn new() -> Self {
        RedditAdapter {
            client: build_http_client(std::time::Duration::from_secs(15)),
        }
    }

    /// Clamps `limit` to Reddit's accepted range, mirroring the Python
    /// tool's `max(20, min(100, limit))` clamp.
    fn clamp_limit(limit: usize) -> usize {
        limit.clamp(20, 100)
    }

    async fn fetch_subreddit(
        &self,
        subreddit: &str,
        sort: RedditSort,
        limit: usize,
    ) -> Result<Vec<Item>, AdapterError> {
        let subreddit = subreddit.trim_start_matches("r/").trim_start_matches('/');
        let clamped = Self::clamp_limit(limit);
        let url = format!(
            "https://www.reddit.com/r/{subreddit}/{}.json?limit={clamped}",
            sort.as_str()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("fetching r/{subreddit}: {e}"),
            })?;

        if let Some(err) = classify_status(response.status(), &format!("r/{subreddit}")) {
            return Err(err);
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| AdapterError::TransientNetwork {
                message: format!("parsing r/{subreddit} response: {e}"),
            })?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| {
                let published_at = chrono::DateTime::from_timestamp(
                    child.data.created_utc as i64,
                    0,
                );
                Item {
                    source_id: child.data.id,
                    title: child.data.title,
                    url: Some(format!("https://www.reddit.com{}", child.data.permalink)),
                    summary: child.data.selftext,
                    published_at,
                    metadata: std::collections::HashMap::from([(
                        "subreddit".to_string(),
                        subreddit.to_string(),
                    )]),
                }
            })
            .collect())
    }
}

impl Default for RedditAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn name(&self) -> &'static str {
        "reddit"
    }

    async fn fetch(&self, cfg: &serde_json::Value, limit: usize) -> Result<Vec<Item>, AdapterError> {
        let config: RedditConfig = serde_json::from_value(cfg.clone()).map_err(|e| {
            AdapterError::ConfigurationMissing {
                field: format!("reddit config: {e}"),
            }
        })?;

        let sort = config
            .reddit_sort
            .as_deref()
            .and_then(RedditSort::parse)
            .unwrap_or(RedditSort::Hot);

        let mut items = Vec::new();
        for subreddit in &config.subreddits {
            let mut fetched = self.fetch_subreddit(subreddit, sort, limit).await?;
            items.append(&mut fetched);
            if items.len() >= limit {
                break;
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_cycles_hot_new_top_rising() {
        assert_eq!(RedditSort::Hot.rotated(0), RedditSort::Hot);
        assert_eq!(RedditSort::Hot.rotated(1), RedditSort::New);
        assert_eq!(RedditSort::Hot.rotated(2), RedditSort::Top);
        assert_eq!(RedditSort::Hot.rotated(3), RedditSort::Rising);
        assert_eq!(RedditSort::Hot.rotated(4), RedditSort::Hot);
    }

    #[test]
    fn clamp_limit_respects_reddit_bounds() {
        assert_eq!(RedditAdapter::clamp_limit(5), 20);
        assert_eq!(RedditAdapter::clamp_limit(500), 100);
        assert_eq!(RedditAdapter::clamp_limit(50), 50);
    }

    #[tokio::test]
    async fn fetch_maps_404_to_not_found() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        // Reddit's real host can't be pointed at wiremock, so this test
        // exercises the shared classify_status path via fetch_subreddit's
        // error mapping logic directly through a local server substitute
        // would require DI; instead we assert the classify_status contract
        // that fetch_subreddit relies on.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/doesnotexist/hot.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_http_client(std::time::Duration::from_secs(5));
        let resp = client
            .get(format!("{}/r/doesnotexist/hot.json", server.uri()))
            .send()
            .await
            .unwrap();
        let err = classify_status(resp.status(), "r/doesnotexist").unwrap();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }
}
