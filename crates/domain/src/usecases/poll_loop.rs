//! Poll loop use case - orchestrates fetching, deduplicating, normalizing and delivering

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::{
    model::{Destination, FeedIdentity, Requester, TickOutcome, Visibility},
    ports::{
        ConfigListener, ConfigStore, ConfigStoreError, DeliveryError, DeliveryOptions, FeedError,
        FeedSource, Publisher, config_keys,
    },
    usecases::{
        dedup::DedupGate,
        normalize::{NormalizationError, PostNormalizer},
    },
};

/// Shown when a manual fetch asked for public visibility without the right to
pub const HIDDEN_ONLY_NOTICE: &str = "Only admins can send this message without being hidden!";

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollLoopConfig {
    /// Time between two ticks
    pub interval: Duration,
}

impl Default for PollLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Runtime settings written by setup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySettings {
    pub identity: Option<FeedIdentity>,
    pub destination: Option<Destination>,
}

impl RelaySettings {
    /// Read the settings from the durable configuration. Unset, null or
    /// malformed entries are reported as missing.
    pub async fn load<Cs: ConfigStore + ?Sized>(store: &Cs) -> Result<Self, ConfigStoreError> {
        let destination = store
            .get(config_keys::CHANNEL_ID)
            .await?
            .and_then(|value| match value {
                serde_json::Value::Number(n) => Destination::parse(&n.to_string()),
                serde_json::Value::String(s) => Destination::parse(&s),
                _ => None,
            });

        let identity = store
            .get(config_keys::USER_HANDLE)
            .await?
            .and_then(|value| value.as_str().and_then(FeedIdentity::parse));

        Ok(Self {
            identity,
            destination,
        })
    }
}

/// Errors that end a single tick. None of them stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Fetch failed: {0}")]
    Fetch(#[source] FeedError),
    #[error("Post {post_id} could not be normalized: {source}")]
    Normalization {
        post_id: String,
        #[source]
        source: NormalizationError,
    },
    #[error("Delivery of {post_id} failed: {source}")]
    Delivery {
        post_id: String,
        #[source]
        source: DeliveryError,
    },
}

impl RelayError {
    /// Pipeline stage the error was raised in, for logs
    pub fn stage(&self) -> &'static str {
        match self {
            RelayError::Configuration(_) => "configure",
            RelayError::Fetch(_) => "fetch",
            RelayError::Normalization { .. } => "normalize",
            RelayError::Delivery { .. } => "deliver",
        }
    }
}

impl From<FeedError> for RelayError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::Configuration(message) => RelayError::Configuration(message),
            other => RelayError::Fetch(other),
        }
    }
}

/// Result of a manual fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualFetch {
    pub outcome: TickOutcome,
    /// Visibility actually used
    pub visibility: Visibility,
    /// Set when the requested visibility was downgraded
    pub notice: Option<&'static str>,
}

/// Poll loop orchestrator
pub struct PollLoop<F, P, Cs>
where
    F: FeedSource + ?Sized,
    P: Publisher + ?Sized,
    Cs: ConfigStore + ?Sized,
{
    feed_source: Arc<F>,
    publisher: Arc<P>,
    config_store: Arc<Cs>,
    normalizer: PostNormalizer,
    gate: DedupGate,
    settings: RwLock<RelaySettings>,
    config: PollLoopConfig,
}

impl<F, P, Cs> PollLoop<F, P, Cs>
where
    F: FeedSource + ?Sized,
    P: Publisher + ?Sized,
    Cs: ConfigStore + ?Sized,
{
    pub fn new(
        feed_source: Arc<F>,
        publisher: Arc<P>,
        config_store: Arc<Cs>,
        normalizer: PostNormalizer,
        gate: DedupGate,
        config: PollLoopConfig,
    ) -> Self {
        Self {
            feed_source,
            publisher,
            config_store,
            normalizer,
            gate,
            settings: RwLock::new(RelaySettings::default()),
            config,
        }
    }

    /// Current runtime settings
    pub async fn settings(&self) -> RelaySettings {
        self.settings.read().await.clone()
    }

    /// Reload identity and destination from the configuration store
    pub async fn reload(&self) -> Result<RelaySettings, ConfigStoreError> {
        let loaded = RelaySettings::load(self.config_store.as_ref()).await?;

        self.feed_source.invalidate().await;
        self.gate.switch_identity(loaded.identity.clone()).await;

        let mut settings = self.settings.write().await;
        if *settings != loaded {
            tracing::info!(
                identity = ?loaded.identity.as_ref().map(FeedIdentity::as_str),
                destination = ?loaded.destination.as_ref().map(Destination::channel_id),
                "Relay settings reloaded"
            );
        }
        *settings = loaded.clone();
        Ok(loaded)
    }

    /// Run one automatic cycle
    pub async fn tick(&self) -> Result<TickOutcome, RelayError> {
        let settings = self.settings().await;

        let (Some(identity), Some(destination)) = (settings.identity, settings.destination) else {
            let reason = "Account identity or destination channel not set; run `skyrelay setup`";
            tracing::info!("{}", reason);
            return Ok(TickOutcome::Skipped {
                reason: reason.to_string(),
            });
        };

        self.relay(&identity, &destination, false, DeliveryOptions::public())
            .await
    }

    /// Fetch and deliver the latest post regardless of the dedup gate
    pub async fn force_fetch(
        &self,
        requester: &Requester,
        requested: Visibility,
    ) -> Result<ManualFetch, RelayError> {
        let visibility = requested.permitted_for(requester);
        let notice = (visibility != requested).then_some(HIDDEN_ONLY_NOTICE);
        if notice.is_some() {
            tracing::info!(requester = ?requester.id, "Manual fetch downgraded to hidden");
        }

        let settings = self.settings().await;
        let identity = settings.identity.ok_or_else(|| {
            RelayError::Configuration("Account identity not set; run `skyrelay setup`".into())
        })?;
        let destination = settings.destination.ok_or_else(|| {
            RelayError::Configuration("Destination channel not set; run `skyrelay setup`".into())
        })?;

        let options = if visibility.is_public() {
            DeliveryOptions::public()
        } else {
            DeliveryOptions::hidden()
        }
        .with_notice(notice);
        let outcome = self.relay(&identity, &destination, true, options).await?;

        Ok(ManualFetch {
            outcome,
            visibility,
            notice,
        })
    }

    /// Drive ticks on the configured interval until `shutdown` resolves.
    /// Messages on `config_changes` trigger a reload between ticks.
    pub async fn run<S>(&self, shutdown: S, mut config_changes: Option<mpsc::Receiver<()>>)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            source = self.feed_source.variant(),
            publisher = self.publisher.platform(),
            "Poll loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_logged().await;
                }
                Some(()) = recv_change(&mut config_changes) => {
                    self.on_config_changed().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("Poll loop stopping");
                    break;
                }
            }
        }
    }

    /// Run one tick, logging instead of returning errors
    pub async fn tick_logged(&self) -> Option<TickOutcome> {
        match self.tick().await {
            Ok(outcome) => {
                match &outcome {
                    TickOutcome::Emitted { post_id, kind, .. } => {
                        tracing::info!(post_id = %post_id, kind = ?kind, "Tick emitted post");
                    }
                    TickOutcome::Unchanged { post_id } => {
                        tracing::debug!(post_id = %post_id, "No new post");
                    }
                    TickOutcome::NotFound => tracing::info!("Account has no posts"),
                    TickOutcome::Skipped { .. } => {}
                }
                Some(outcome)
            }
            Err(error) => {
                tracing::error!(stage = error.stage(), error = %error, "Tick failed");
                None
            }
        }
    }

    async fn relay(
        &self,
        identity: &FeedIdentity,
        destination: &Destination,
        force: bool,
        options: DeliveryOptions,
    ) -> Result<TickOutcome, RelayError> {
        tracing::debug!(identity = %identity, force = force, "Fetching latest post");

        let Some(raw) = self.feed_source.fetch_latest(identity).await? else {
            return Ok(TickOutcome::NotFound);
        };
        let post_id = raw.id().to_string();

        let mut gate = self.gate.enter().await;
        if !gate.should_emit(&post_id, force) {
            return Ok(TickOutcome::Unchanged { post_id });
        }

        let post = match self.normalizer.normalize(&raw) {
            Ok(post) => post,
            Err(source) => {
                // The same payload would fail again next tick
                tracing::warn!(post_id = %post_id, stage = "normalize", error = %source, "Skipping malformed post");
                gate.record_emitted(&post_id).await;
                return Err(RelayError::Normalization { post_id, source });
            }
        };

        let delivery = self
            .publisher
            .deliver(&post, destination, options)
            .await
            .map_err(|source| RelayError::Delivery {
                post_id: post_id.clone(),
                source,
            })?;

        gate.record_emitted(&post_id).await;

        tracing::info!(
            post_id = %post_id,
            kind = ?post.kind,
            reply = post.is_reply(),
            destination = %destination.channel_id(),
            visible_to_all = options.visible_to_all,
            delivery_id = %delivery.id,
            platform = self.publisher.platform(),
            "Delivered post"
        );

        Ok(TickOutcome::Emitted {
            post_id,
            kind: post.kind,
            delivery_id: delivery.id,
        })
    }
}

#[async_trait]
impl<F, P, Cs> ConfigListener for PollLoop<F, P, Cs>
where
    F: FeedSource + ?Sized,
    P: Publisher + ?Sized,
    Cs: ConfigStore + ?Sized,
{
    async fn on_config_changed(&self) {
        if let Err(error) = self.reload().await {
            tracing::error!(stage = "configure", error = %error, "Failed to reload configuration");
        }
    }
}

async fn recv_change(changes: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NormalizedPost, PostKind, RawPost};
    use crate::ports::{Delivery, SystemClock};
    use crate::usecases::dedup::PollState;
    use crate::usecases::normalize::NormalizerConfig;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    struct FakeFeedSource {
        responses: Mutex<VecDeque<Result<Option<RawPost>, FeedError>>>,
        calls: Mutex<usize>,
    }

    impl FakeFeedSource {
        fn new(responses: Vec<Result<Option<RawPost>, FeedError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeedSource {
        async fn fetch_latest(
            &self,
            _identity: &FeedIdentity,
        ) -> Result<Option<RawPost>, FeedError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        fn variant(&self) -> &'static str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        delivered: Mutex<Vec<(String, bool)>>,
        failures_left: Mutex<usize>,
    }

    impl FakePublisher {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: Mutex::new(times),
                ..Default::default()
            }
        }

        fn delivered(&self) -> Vec<(String, bool)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn deliver(
            &self,
            post: &NormalizedPost,
            _destination: &Destination,
            options: DeliveryOptions,
        ) -> Result<Delivery, DeliveryError> {
            {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(DeliveryError::Network("connection reset".to_string()));
                }
            }
            self.delivered
                .lock()
                .unwrap()
                .push((post.id.clone(), options.visible_to_all));
            Ok(Delivery {
                id: format!("msg-{}", post.id),
                url: None,
            })
        }

        fn platform(&self) -> &'static str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeConfigStore {
        values: Mutex<HashMap<String, serde_json::Value>>,
    }

    impl FakeConfigStore {
        fn configured() -> Self {
            let store = Self::default();
            {
                let mut values = store.values.lock().unwrap();
                values.insert(config_keys::CHANNEL_ID.into(), serde_json::json!(1234));
                values.insert(
                    config_keys::USER_HANDLE.into(),
                    serde_json::json!("alice.bsky.social"),
                );
            }
            store
        }
    }

    #[async_trait]
    impl ConfigStore for FakeConfigStore {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, ConfigStoreError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), ConfigStoreError> {
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    fn post(rkey: &str) -> RawPost {
        serde_json::from_value(serde_json::json!({
            "post": {
                "uri": format!("at://did:plc:alice/app.bsky.feed.post/{rkey}"),
                "author": {"handle": "alice.bsky.social"},
                "record": {"text": "hello", "createdAt": "2024-01-15T12:00:00.000Z"}
            }
        }))
        .unwrap()
    }

    fn malformed() -> RawPost {
        serde_json::from_value(serde_json::json!({
            "post": {"uri": "at://did:plc:alice/app.bsky.feed.post/bad", "author": {}}
        }))
        .unwrap()
    }

    fn uri(rkey: &str) -> String {
        format!("at://did:plc:alice/app.bsky.feed.post/{rkey}")
    }

    type TestLoop = PollLoop<FakeFeedSource, FakePublisher, FakeConfigStore>;

    async fn build(
        feed: FakeFeedSource,
        publisher: FakePublisher,
        store: FakeConfigStore,
    ) -> (TestLoop, Arc<FakeFeedSource>, Arc<FakePublisher>) {
        let feed = Arc::new(feed);
        let publisher = Arc::new(publisher);
        let clock = Arc::new(SystemClock);
        let poll_loop = PollLoop::new(
            Arc::clone(&feed),
            Arc::clone(&publisher),
            Arc::new(store),
            PostNormalizer::new(clock.clone(), NormalizerConfig::default()),
            DedupGate::new(PollState::default(), clock),
            PollLoopConfig::default(),
        );
        poll_loop.reload().await.unwrap();
        (poll_loop, feed, publisher)
    }

    #[tokio::test]
    async fn test_tick_skips_without_configuration() {
        let (poll_loop, feed, _) = build(
            FakeFeedSource::new(vec![Ok(Some(post("p1")))]),
            FakePublisher::default(),
            FakeConfigStore::default(),
        )
        .await;

        let outcome = poll_loop.tick().await.unwrap();

        assert!(matches!(outcome, TickOutcome::Skipped { .. }));
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_dedup_scenario() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![
                Ok(Some(post("p1"))),
                Ok(Some(post("p1"))),
                Ok(Some(post("p2"))),
                Ok(Some(post("p2"))),
            ]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        assert!(matches!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Emitted { ref post_id, kind: PostKind::Original, .. } if *post_id == uri("p1")
        ));
        assert_eq!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Unchanged { post_id: uri("p1") }
        );
        assert!(matches!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Emitted { ref post_id, .. } if *post_id == uri("p2")
        ));

        let manual = poll_loop
            .force_fetch(&Requester::elevated(None), Visibility::Everyone)
            .await
            .unwrap();
        assert!(matches!(manual.outcome, TickOutcome::Emitted { .. }));
        assert_eq!(manual.visibility, Visibility::Everyone);
        assert!(manual.notice.is_none());

        let delivered: Vec<_> = publisher
            .delivered()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(delivered, vec![uri("p1"), uri("p2"), uri("p2")]);
    }

    #[tokio::test]
    async fn test_forced_fetch_updates_gate() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![Ok(Some(post("p1"))), Ok(Some(post("p1")))]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        poll_loop
            .force_fetch(&Requester::elevated(None), Visibility::RequesterOnly)
            .await
            .unwrap();

        assert_eq!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Unchanged { post_id: uri("p1") }
        );
        assert_eq!(publisher.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_member_forced_fetch_is_hidden() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![Ok(Some(post("p1")))]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        let manual = poll_loop
            .force_fetch(&Requester::member(Some("u1".into())), Visibility::Everyone)
            .await
            .unwrap();

        assert_eq!(manual.visibility, Visibility::RequesterOnly);
        assert_eq!(manual.notice, Some(HIDDEN_ONLY_NOTICE));
        assert_eq!(publisher.delivered(), vec![(uri("p1"), false)]);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_tick() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![Ok(Some(post("p1"))), Ok(Some(post("p1")))]),
            FakePublisher::failing(1),
            FakeConfigStore::configured(),
        )
        .await;

        let error = poll_loop.tick().await.unwrap_err();
        assert!(matches!(error, RelayError::Delivery { .. }));
        assert_eq!(error.stage(), "deliver");

        assert!(matches!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Emitted { .. }
        ));
        assert_eq!(publisher.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_advance() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![
                Err(FeedError::Status {
                    status: 502,
                    reason: "Bad Gateway".into(),
                }),
                Ok(Some(post("p1"))),
            ]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        assert!(matches!(
            poll_loop.tick().await,
            Err(RelayError::Fetch(FeedError::Status { status: 502, .. }))
        ));
        assert!(matches!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Emitted { .. }
        ));
        assert_eq!(publisher.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_feed_configuration_error_maps_to_configuration() {
        let (poll_loop, _, _) = build(
            FakeFeedSource::new(vec![Err(FeedError::Configuration("no creds".into()))]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        assert!(matches!(
            poll_loop.tick().await,
            Err(RelayError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_not_found_is_not_an_error() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![Ok(None)]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        assert_eq!(poll_loop.tick().await.unwrap(), TickOutcome::NotFound);
        assert!(publisher.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_post_is_skipped_once() {
        let (poll_loop, _, publisher) = build(
            FakeFeedSource::new(vec![Ok(Some(malformed())), Ok(Some(malformed()))]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        assert!(matches!(
            poll_loop.tick().await,
            Err(RelayError::Normalization { .. })
        ));
        assert!(matches!(
            poll_loop.tick().await.unwrap(),
            TickOutcome::Unchanged { .. }
        ));
        assert!(publisher.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_tick_logged_survives_errors() {
        let (poll_loop, _, _) = build(
            FakeFeedSource::new(vec![
                Err(FeedError::Network("timeout".into())),
                Ok(Some(post("p1"))),
            ]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        assert!(poll_loop.tick_logged().await.is_none());
        assert!(matches!(
            poll_loop.tick_logged().await,
            Some(TickOutcome::Emitted { .. })
        ));
    }

    #[tokio::test]
    async fn test_settings_accept_string_channel_id() {
        let store = FakeConfigStore::default();
        store
            .set(config_keys::CHANNEL_ID, serde_json::json!("<#987>"))
            .await
            .unwrap();
        store
            .set(config_keys::USER_HANDLE, serde_json::Value::Null)
            .await
            .unwrap();

        let settings = RelaySettings::load(&store).await.unwrap();

        assert_eq!(settings.destination.unwrap().channel_id(), "987");
        assert!(settings.identity.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let (poll_loop, feed, publisher) = build(
            FakeFeedSource::new(vec![
                Ok(Some(post("p1"))),
                Err(FeedError::Network("reset".into())),
                Ok(Some(post("p2"))),
            ]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        // Ticks fire at 0s, 300s and 600s; shutdown lands before the fourth
        let shutdown = tokio::time::sleep(Duration::from_secs(750));
        poll_loop.run(shutdown, None).await;

        assert_eq!(feed.calls(), 3);
        assert_eq!(publisher.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_config_change_reloads_settings() {
        let (poll_loop, _, _) = build(
            FakeFeedSource::new(vec![]),
            FakePublisher::default(),
            FakeConfigStore::configured(),
        )
        .await;

        poll_loop
            .config_store
            .set(config_keys::USER_HANDLE, serde_json::json!("@bob.bsky.social"))
            .await
            .unwrap();
        poll_loop.on_config_changed().await;

        assert_eq!(
            poll_loop.settings().await.identity.unwrap().as_str(),
            "bob.bsky.social"
        );
    }
}
