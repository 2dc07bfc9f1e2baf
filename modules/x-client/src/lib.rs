pub mod error;
pub mod types;

pub use error::{Result, XError};
pub use types::{Media, ResolvedTweet, SearchPage, SearchResponse, Tweet, User};

const BASE_URL: &str = "https://api.twitter.com/2";

/// The recent-search endpoint rejects page sizes outside this range.
const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;

pub struct XClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl XClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Search the last seven days of posts. Returns one page plus the cursor
    /// for the next one.
    pub async fn search_recent(
        &self,
        query: &str,
        max_results: u32,
        next_token: Option<&str>,
    ) -> Result<SearchPage> {
        let max_results = max_results.clamp(MIN_RESULTS, MAX_RESULTS).to_string();
        let url = format!("{}/tweets/search/recent", self.base_url);

        let mut params: Vec<(&str, &str)> = vec![
            ("query", query),
            ("max_results", &max_results),
            ("tweet.fields", "created_at,author_id,attachments"),
            ("expansions", "author_id,attachments.media_keys"),
            ("user.fields", "username,name"),
            ("media.fields", "type,url,preview_image_url"),
        ];
        if let Some(token) = next_token {
            params.push(("next_token", token));
        }

        tracing::debug!(query, max_results = %max_results, "Searching recent posts");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let reset_at = resp
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            return Err(XError::RateLimited { reset_at });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        let page = parsed.into_page();
        tracing::info!(
            query,
            count = page.tweets.len(),
            has_more = page.next_token.is_some(),
            "Fetched recent posts"
        );

        Ok(page)
    }
}
