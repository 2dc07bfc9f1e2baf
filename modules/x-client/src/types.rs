use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Response body of `GET /2/tweets/search/recent`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub meta: SearchMeta,
}

/// A single tweet as returned with `tweet.fields=created_at,author_id,attachments`.
#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub attachments: Option<Attachments>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachments {
    #[serde(default)]
    pub media_keys: Vec<String>,
}

/// Expanded objects referenced from `data` (authors, media).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub media: Vec<Media>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub media_key: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: Option<String>,
    pub preview_image_url: Option<String>,
}

impl Media {
    /// Photos carry `url`; videos and GIFs only carry a preview image.
    pub fn best_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.preview_image_url.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub result_count: u32,
    pub next_token: Option<String>,
    pub newest_id: Option<String>,
    pub oldest_id: Option<String>,
}

/// A tweet joined with its expanded author and media.
#[derive(Debug, Clone)]
pub struct ResolvedTweet {
    pub id: String,
    pub text: String,
    pub author_username: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub media: Vec<Media>,
}

impl ResolvedTweet {
    pub fn permalink(&self) -> String {
        match &self.author_username {
            Some(user) => format!("https://x.com/{}/status/{}", user, self.id),
            None => format!("https://x.com/i/web/status/{}", self.id),
        }
    }
}

/// One page of search results with the cursor for the next page.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub tweets: Vec<ResolvedTweet>,
    pub next_token: Option<String>,
}

impl SearchResponse {
    /// Join tweets against the `includes` block.
    pub fn into_page(self) -> SearchPage {
        let users: HashMap<&str, &User> = self
            .includes
            .users
            .iter()
            .map(|u| (u.id.as_str(), u))
            .collect();
        let media: HashMap<&str, &Media> = self
            .includes
            .media
            .iter()
            .map(|m| (m.media_key.as_str(), m))
            .collect();

        let tweets = self
            .data
            .iter()
            .map(|t| ResolvedTweet {
                id: t.id.clone(),
                text: t.text.clone(),
                author_username: t
                    .author_id
                    .as_deref()
                    .and_then(|id| users.get(id))
                    .map(|u| u.username.clone()),
                created_at: t.created_at,
                media: t
                    .attachments
                    .as_ref()
                    .map(|a| {
                        a.media_keys
                            .iter()
                            .filter_map(|k| media.get(k.as_str()).map(|m| (*m).clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        SearchPage {
            tweets,
            next_token: self.meta.next_token,
        }
    }
}
