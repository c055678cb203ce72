pub mod error;
pub mod types;

pub use error::{FeedError, Result};
pub use types::{PostsPage, UsersPage, WireAuthor, WirePost};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FeedClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Fetch one page of a community's top-level posts, newest first.
    pub async fn community_posts(
        &self,
        community_id: &str,
        cursor: Option<&str>,
    ) -> Result<PostsPage> {
        let url = format!("{}/communities/{}/posts", self.base_url, community_id);
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.get(&url, &params).await
    }

    /// Fetch one page of replies to a post, optionally bounded to replies
    /// created after `since`.
    pub async fn post_replies(
        &self,
        post_id: &str,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<PostsPage> {
        let url = format!("{}/posts/{}/replies", self.base_url, post_id);
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        if let Some(since) = since {
            params.push(("since", since.to_rfc3339()));
        }
        self.get(&url, &params).await
    }

    /// Fetch the accounts following `handle`.
    pub async fn followers(&self, handle: &str) -> Result<Vec<WireAuthor>> {
        let url = format!("{}/users/{}/followers", self.base_url, handle);
        let page: UsersPage = self.get(&url, &[]).await?;
        Ok(page.users)
    }

    /// Fetch the accounts `handle` follows.
    pub async fn followings(&self, handle: &str) -> Result<Vec<WireAuthor>> {
        let url = format!("{}/users/{}/followings", self.base_url, handle);
        let page: UsersPage = self.get(&url, &[]).await?;
        Ok(page.users)
    }

    /// Run a post search query (ticker-mention history, handle lookups).
    pub async fn search(&self, query: &str, cursor: Option<&str>) -> Result<PostsPage> {
        let url = format!("{}/search", self.base_url);
        let mut params: Vec<(&str, String)> = vec![("query", query.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.get(&url, &params).await
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, params: &[(&str, String)]) -> Result<T> {
        debug!(url, "Feed API request");

        let resp = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }
}
