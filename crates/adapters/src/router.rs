//! Visibility router: public deliveries to one publisher, hidden ones to another

use async_trait::async_trait;
use skyrelay_domain::{
    Delivery, DeliveryError, DeliveryOptions, Destination, NormalizedPost, Publisher,
};
use std::sync::Arc;

pub struct VisibilityRouter {
    public: Arc<dyn Publisher>,
    private: Arc<dyn Publisher>,
}

impl VisibilityRouter {
    pub fn new(public: Arc<dyn Publisher>, private: Arc<dyn Publisher>) -> Self {
        Self { public, private }
    }

    fn route(&self, options: DeliveryOptions) -> &Arc<dyn Publisher> {
        if options.visible_to_all {
            &self.public
        } else {
            &self.private
        }
    }
}

#[async_trait]
impl Publisher for VisibilityRouter {
    async fn deliver(
        &self,
        post: &NormalizedPost,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Delivery, DeliveryError> {
        let target = self.route(options);
        tracing::debug!(
            post_id = %post.id,
            visible_to_all = options.visible_to_all,
            platform = target.platform(),
            "Routing delivery"
        );
        target.deliver(post, destination, options).await
    }

    fn platform(&self) -> &'static str {
        self.public.platform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyrelay_domain::PostKind;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    struct Recording {
        name: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Publisher for Recording {
        async fn deliver(
            &self,
            post: &NormalizedPost,
            _destination: &Destination,
            _options: DeliveryOptions,
        ) -> Result<Delivery, DeliveryError> {
            self.seen.lock().unwrap().push(post.id.clone());
            Ok(Delivery {
                id: format!("{}-{}", self.name, post.id),
                url: None,
            })
        }

        fn platform(&self) -> &'static str {
            self.name
        }
    }

    fn post() -> NormalizedPost {
        NormalizedPost {
            id: "p1".to_string(),
            kind: PostKind::Original,
            display_name: "Alice".to_string(),
            author_handle: "alice.bsky.social".to_string(),
            body_text: String::new(),
            post_url: "https://bsky.app/profile/alice.bsky.social/post/p1".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            avatar_url: None,
            media: None,
            reply_context: None,
            leading_label: "New Bluesky post!".to_string(),
            reposted_by: None,
        }
    }

    #[tokio::test]
    async fn test_routes_by_visibility() {
        let public = Recording::new("public");
        let private = Recording::new("private");
        let router = VisibilityRouter::new(public.clone(), private.clone());
        let destination = Destination::parse("1").unwrap();

        let shown = router
            .deliver(&post(), &destination, DeliveryOptions::public())
            .await
            .unwrap();
        let hidden = router
            .deliver(&post(), &destination, DeliveryOptions::hidden())
            .await
            .unwrap();

        assert_eq!(shown.id, "public-p1");
        assert_eq!(hidden.id, "private-p1");
        assert_eq!(public.seen.lock().unwrap().len(), 1);
        assert_eq!(private.seen.lock().unwrap().len(), 1);
        assert_eq!(router.platform(), "public");
    }
}
