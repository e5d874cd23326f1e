//! Bluesky feed adapters

mod public;
mod session;

pub use public::PublicFeedSource;
pub use session::AuthenticatedFeedSource;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use skyrelay_domain::{FeedError, FeedIdentity, FeedSource, RawPost};
use std::path::Path;

pub const PUBLIC_API_BASE_URL: &str = "https://public.api.bsky.app";
pub const PDS_BASE_URL: &str = "https://bsky.social";

const AUTHOR_FEED_PATH: &str = "/xrpc/app.bsky.feed.getAuthorFeed";
const FEED_FILTER: &str = "posts_with_replies";

/// Items stay untyped so one bad entry does not fail the whole page; a
/// decoded item with missing fields is reported later by normalization.
#[derive(Deserialize)]
struct AuthorFeed {
    #[serde(default)]
    feed: Vec<serde_json::Value>,
}

impl AuthorFeed {
    fn into_posts(self) -> Result<Vec<RawPost>, FeedError> {
        self.feed.into_iter().map(decode_item).collect()
    }

    fn into_latest(self) -> Result<Option<RawPost>, FeedError> {
        self.feed.into_iter().next().map(decode_item).transpose()
    }
}

fn decode_item(item: serde_json::Value) -> Result<RawPost, FeedError> {
    serde_json::from_value(item).map_err(|e| FeedError::Decode(format!("Feed item: {}", e)))
}

#[derive(Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Request the newest item of an author feed, replies included
async fn get_latest(
    client: &Client,
    base_url: &str,
    identity: &FeedIdentity,
    access_token: Option<&str>,
) -> Result<Option<RawPost>, FeedError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), AUTHOR_FEED_PATH);

    let mut request = client.get(&url).query(&[
        ("actor", identity.as_str()),
        ("limit", "1"),
        ("filter", FEED_FILTER),
    ]);
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| FeedError::Network(e.to_string()))?;

    let response = check_status(response).await?;

    let feed: AuthorFeed = response
        .json()
        .await
        .map_err(|e| FeedError::Decode(e.to_string()))?;

    feed.into_latest()
}

/// Map non-success responses onto feed errors
async fn check_status(response: Response) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<XrpcError>(&body)
        .ok()
        .and_then(|e| e.message.or(e.error))
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED {
        return Err(FeedError::Auth(reason));
    }

    Err(FeedError::Status {
        status: status.as_u16(),
        reason,
    })
}

/// Stub feed source for testing and offline runs
pub struct StubFeedSource {
    posts: std::sync::Mutex<Vec<RawPost>>,
}

impl StubFeedSource {
    /// Create an empty stub
    pub fn empty() -> Self {
        Self::with_posts(vec![])
    }

    /// Posts are served newest-last; each fetch returns the current last one
    pub fn with_posts(posts: Vec<RawPost>) -> Self {
        Self {
            posts: std::sync::Mutex::new(posts),
        }
    }

    /// Load an author-feed page (`{"feed": [...]}`, newest first) from disk
    pub fn from_feed_file(path: &Path) -> Result<Self, FeedError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeedError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let page: AuthorFeed =
            serde_json::from_str(&content).map_err(|e| FeedError::Decode(e.to_string()))?;

        let mut posts = page.into_posts()?;
        posts.reverse();
        Ok(Self::with_posts(posts))
    }

    /// Make `post` the newest item
    pub fn push(&self, post: RawPost) {
        if let Ok(mut posts) = self.posts.lock() {
            posts.push(post);
        }
    }
}

#[async_trait]
impl FeedSource for StubFeedSource {
    async fn fetch_latest(&self, _identity: &FeedIdentity) -> Result<Option<RawPost>, FeedError> {
        let posts = self
            .posts
            .lock()
            .map_err(|e| FeedError::Network(e.to_string()))?;
        Ok(posts.last().cloned())
    }

    fn variant(&self) -> &'static str {
        "stub"
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn post(rkey: &str) -> RawPost {
        serde_json::from_value(serde_json::json!({
            "post": {"uri": format!("at://did:plc:alice/app.bsky.feed.post/{rkey}")}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_stub_returns_newest() {
        let stub = StubFeedSource::with_posts(vec![post("a")]);
        stub.push(post("b"));

        let identity = FeedIdentity::parse("alice.bsky.social").unwrap();
        let latest = stub.fetch_latest(&identity).await.unwrap().unwrap();

        assert!(latest.id().ends_with("/b"));
    }

    #[tokio::test]
    async fn test_stub_from_feed_file_serves_first_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, fixtures::feed_page("3k", "hello").to_string()).unwrap();

        let stub = StubFeedSource::from_feed_file(&path).unwrap();
        let identity = FeedIdentity::parse("alice.bsky.social").unwrap();
        let latest = stub.fetch_latest(&identity).await.unwrap().unwrap();

        assert!(latest.id().ends_with("/3k"));
    }

    #[test]
    fn test_stub_from_missing_file_is_configuration_error() {
        let result = StubFeedSource::from_feed_file(Path::new("/nonexistent/feed.json"));
        assert!(matches!(result, Err(FeedError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_empty_stub_is_not_found() {
        let identity = FeedIdentity::parse("alice.bsky.social").unwrap();
        assert!(
            StubFeedSource::empty()
                .fetch_latest(&identity)
                .await
                .unwrap()
                .is_none()
        );
    }
}
