//! Unauthenticated feed source backed by the public AppView

use async_trait::async_trait;
use reqwest::Client;
use skyrelay_domain::{FeedError, FeedIdentity, FeedSource, RawPost};
use std::time::Duration;

use super::{PUBLIC_API_BASE_URL, get_latest};

/// Reads author feeds from the public API, no account needed
pub struct PublicFeedSource {
    client: Client,
    base_url: String,
}

impl PublicFeedSource {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(PUBLIC_API_BASE_URL.to_string(), timeout)
    }

    pub fn with_base_url(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, base_url }
    }
}

#[async_trait]
impl FeedSource for PublicFeedSource {
    async fn fetch_latest(&self, identity: &FeedIdentity) -> Result<Option<RawPost>, FeedError> {
        tracing::debug!(identity = %identity, "Fetching author feed from public API");

        let latest = get_latest(&self.client, &self.base_url, identity, None).await?;

        tracing::debug!(
            identity = %identity,
            post_id = ?latest.as_ref().map(RawPost::id),
            "Fetched author feed"
        );
        Ok(latest)
    }

    fn variant(&self) -> &'static str {
        "public"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluesky::fixtures::feed_page;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity() -> FeedIdentity {
        FeedIdentity::parse("alice.bsky.social").unwrap()
    }

    fn source(server: &MockServer) -> PublicFeedSource {
        PublicFeedSource::with_base_url(server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_fetch_latest_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .and(query_param("actor", "alice.bsky.social"))
            .and(query_param("limit", "1"))
            .and(query_param("filter", "posts_with_replies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed_page("3kabc", "hi")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let post = source(&mock_server)
            .fetch_latest(&identity())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(post.id(), "at://did:plc:alice/app.bsky.feed.post/3kabc");
        assert_eq!(post.post.record.text, "hi");
        assert_eq!(post.post.author.display_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_empty_feed_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"feed": []})))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).fetch_latest(&identity()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_provider_error_reports_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "InvalidRequest",
                "message": "Profile not found"
            })))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).fetch_latest(&identity()).await;

        match result {
            Err(FeedError::Status { status, reason }) => {
                assert_eq!(status, 400);
                assert_eq!(reason, "Profile not found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_item_without_post_is_returned_for_normalization() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "feed": [{"reason": {"$type": "app.bsky.feed.defs#reasonPin"}}]
            })))
            .mount(&mock_server)
            .await;

        let raw = source(&mock_server)
            .fetch_latest(&identity())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw.id(), "");

        let normalizer = skyrelay_domain::usecases::PostNormalizer::new(
            std::sync::Arc::new(skyrelay_domain::SystemClock),
            Default::default(),
        );
        assert!(matches!(
            normalizer.normalize(&raw),
            Err(skyrelay_domain::usecases::NormalizationError::MissingField("post.uri"))
        ));
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).fetch_latest(&identity()).await;

        assert!(matches!(result, Err(FeedError::Decode(_))));
    }
}
