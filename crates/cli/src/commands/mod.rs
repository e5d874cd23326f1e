//! Subcommands and the wiring they share

pub mod config;
pub mod doctor;
pub mod getpost;
pub mod keygen;
pub mod run;
pub mod setup;

use anyhow::{Context, Result, bail};
use skyrelay_adapters::{
    bluesky::{AuthenticatedFeedSource, PublicFeedSource, StubFeedSource},
    cipher::{AesGcmCipher, KEY_ENV_VAR},
    config::JsonFileConfigStore,
    console::ConsolePublisher,
    discord::DiscordPublisher,
    outbox::{OutboxPublisher, OutboxWriter},
    router::VisibilityRouter,
    state::{InMemoryStateStore, SqliteStateStore},
};
use skyrelay_domain::{
    Clock, ConfigStore, FeedSource, PollStateStore, Publisher, SystemClock,
    usecases::{
        DedupGate, NormalizerConfig, PollLoop, PollLoopConfig, PostNormalizer, Renderer,
        StoredCredentials,
    },
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, FeedSourceKind};

pub type Relay = PollLoop<dyn FeedSource, dyn Publisher, JsonFileConfigStore>;

/// Where relayed posts end up
#[derive(Debug, Clone)]
pub enum Output {
    /// Discord channel; hidden deliveries are printed locally
    Discord,
    /// Plain text on stdout
    Console,
    /// JSON lines appended to a file
    Outbox(PathBuf),
}

pub async fn open_config_store(config: &AppConfig) -> Result<Arc<JsonFileConfigStore>> {
    let path = &config.general.config_json_path;
    let store = JsonFileConfigStore::open(path.clone())
        .await
        .with_context(|| format!("Failed to open config store: {}", path.display()))?;
    Ok(Arc::new(store))
}

pub fn load_cipher() -> Result<Option<AesGcmCipher>> {
    AesGcmCipher::from_env().with_context(|| format!("Invalid {}", KEY_ENV_VAR))
}

pub fn build_feed_source(
    config: &AppConfig,
    store: Arc<JsonFileConfigStore>,
) -> Result<Arc<dyn FeedSource>> {
    let timeout = config.poll.fetch_timeout();

    match config.feed.source {
        FeedSourceKind::Public => Ok(Arc::new(PublicFeedSource::with_base_url(
            config.feed.public_base_url.clone(),
            timeout,
        ))),
        FeedSourceKind::Authenticated => {
            let Some(cipher) = load_cipher()? else {
                bail!(
                    "{} must be set to use the authenticated feed source",
                    KEY_ENV_VAR
                );
            };
            let credentials = StoredCredentials::new(store, Arc::new(cipher));
            Ok(Arc::new(AuthenticatedFeedSource::with_base_url(
                Arc::new(credentials),
                config.feed.pds_base_url.clone(),
                timeout,
            )))
        }
        FeedSourceKind::Stub => match &config.feed.stub_feed_path {
            Some(path) => Ok(Arc::new(StubFeedSource::from_feed_file(path).with_context(
                || format!("Failed to load stub feed: {}", path.display()),
            )?)),
            None => Ok(Arc::new(StubFeedSource::empty())),
        },
    }
}

pub fn build_discord(config: &AppConfig) -> Result<DiscordPublisher> {
    let token = config.load_bot_token()?;
    Ok(DiscordPublisher::with_base_url(
        token,
        config.discord.api_base_url.clone(),
        Renderer::default(),
        config.discord.timeout(),
    ))
}

pub async fn build_publisher(config: &AppConfig, output: &Output) -> Result<Arc<dyn Publisher>> {
    let publisher: Arc<dyn Publisher> = match output {
        Output::Discord => {
            let discord = Arc::new(build_discord(config)?);
            let local = Arc::new(ConsolePublisher::stdout(Renderer::default()));
            Arc::new(VisibilityRouter::new(discord, local))
        }
        Output::Console => Arc::new(ConsolePublisher::stdout(Renderer::default())),
        Output::Outbox(path) => {
            let writer = OutboxWriter::new(path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            tracing::info!(outbox = %path.display(), "Writing posts to outbox");
            Arc::new(OutboxPublisher::new(writer))
        }
    };
    Ok(publisher)
}

/// Assemble the relay and load the settings written by setup
pub async fn build_relay(config: &AppConfig, output: &Output) -> Result<Arc<Relay>> {
    let store = open_config_store(config).await?;
    let feed_source = build_feed_source(config, Arc::clone(&store))?;
    let publisher = build_publisher(config, output).await?;

    // Dry runs must not move the persisted checkpoint
    let state_store: Arc<dyn PollStateStore> = match output {
        Output::Console => Arc::new(InMemoryStateStore::new()),
        _ => Arc::new(
            SqliteStateStore::new(&config.general.state_db_path)
                .await
                .context("Failed to initialize SQLite state store")?,
        ),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gate = DedupGate::with_store(state_store, Arc::clone(&clock));
    let normalizer = PostNormalizer::new(
        clock,
        NormalizerConfig {
            web_base_url: config.feed.web_base_url.clone(),
        },
    );

    let relay = Arc::new(PollLoop::new(
        feed_source,
        publisher,
        Arc::clone(&store),
        normalizer,
        gate,
        PollLoopConfig {
            interval: config.poll.interval(),
        },
    ));

    relay
        .reload()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    Ok(relay)
}

/// Settings present in the config store, for status output
pub async fn describe_store(store: &dyn ConfigStore) -> Result<serde_json::Value> {
    let settings = skyrelay_domain::usecases::RelaySettings::load(store).await?;
    Ok(serde_json::json!({
        "channel_id": settings.destination.as_ref().map(|d| d.channel_id().to_string()),
        "identity": settings.identity.as_ref().map(|i| i.as_str().to_string()),
    }))
}
