//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{Destination, FeedIdentity, NormalizedPost, PollCheckpoint, RawPost};

/// Error type for feed source operations
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Feed provider returned HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Port for fetching the latest post of an account
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the single most recent post (replies included).
    /// `Ok(None)` means the account has no posts.
    async fn fetch_latest(&self, identity: &FeedIdentity) -> Result<Option<RawPost>, FeedError>;

    /// Drop cached sessions so the next fetch picks up new configuration
    async fn invalidate(&self) {}

    /// Short name for logs ("public", "authenticated")
    fn variant(&self) -> &'static str;
}

/// Error type for delivery operations
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Destination {0} is forbidden")]
    Forbidden(String),
    #[error("Destination {0} not found")]
    NotFound(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Options for a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub visible_to_all: bool,
    /// Heading shown above the post, e.g. why it was hidden
    pub notice: Option<&'static str>,
}

impl DeliveryOptions {
    pub fn public() -> Self {
        Self {
            visible_to_all: true,
            notice: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible_to_all: false,
            notice: None,
        }
    }

    pub fn with_notice(mut self, notice: Option<&'static str>) -> Self {
        self.notice = notice;
        self
    }
}

/// Receipt of a successful delivery
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Platform-specific message ID
    pub id: String,
    /// URL to the delivered message, if available
    pub url: Option<String>,
}

/// Port for delivering normalized posts
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn deliver(
        &self,
        post: &NormalizedPost,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Delivery, DeliveryError>;

    /// Get the platform name (e.g., "discord", "outbox")
    fn platform(&self) -> &'static str;
}

/// Port for checking that a destination exists and is reachable
#[async_trait]
pub trait DestinationValidator: Send + Sync {
    async fn check(&self, destination: &Destination) -> Result<bool, DeliveryError>;
}

/// Well-known keys of the durable configuration object
pub mod config_keys {
    pub const CHANNEL_ID: &str = "CHANNEL_ID";
    pub const USER_HANDLE: &str = "BLSKY_USER_HANDLE";
    pub const ENCRYPTED_USER: &str = "BLSKY_USER";
    pub const ENCRYPTED_PASSWORD: &str = "BLSKY_PASS";
}

/// Error type for the configuration store
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration document: {0}")]
    Format(String),
}

/// Port for the durable JSON-object configuration written by setup
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, ConfigStoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), ConfigStoreError>;
}

/// Error type for credential encryption
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Encryption key error: {0}")]
    Key(String),
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Port for symmetric encryption of stored credentials
pub trait CredentialCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    fn decrypt(&self, token: &str) -> Result<String, CipherError>;
}

/// Login credentials for the authenticated feed variant
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Error type for credential lookup
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Config store error: {0}")]
    Store(#[from] ConfigStoreError),
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
}

/// Port for obtaining decrypted login credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// `Ok(None)` when no credentials have been stored yet
    async fn credentials(&self) -> Result<Option<Credentials>, CredentialError>;
}

/// Error type for poll state persistence
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for persisting the last emitted post across restarts
#[async_trait]
pub trait PollStateStore: Send + Sync {
    async fn load(&self, identity: &FeedIdentity) -> Result<Option<PollCheckpoint>, StateError>;

    async fn save(&self, checkpoint: &PollCheckpoint) -> Result<(), StateError>;
}

/// Error type for interactive conversations
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for a private two-way conversation with the person running setup
#[async_trait]
pub trait Conversation: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), ConversationError>;

    /// Wait for the next message. `Ok(None)` when the other side is gone.
    async fn receive(&self) -> Result<Option<String>, ConversationError>;
}

/// Port notified after the durable configuration was rewritten
#[async_trait]
pub trait ConfigListener: Send + Sync {
    async fn on_config_changed(&self);
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
