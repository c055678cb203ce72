use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAuthor {
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePost {
    pub id: String,
    pub author: WireAuthor,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
}

/// One page of posts or replies, newest first.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsPage {
    #[serde(default)]
    pub posts: Vec<WirePost>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersPage {
    #[serde(default)]
    pub users: Vec<WireAuthor>,
}
