//! Configuration loading and management

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// JSON file holding the channel, account and encrypted credentials
    #[serde(default = "default_config_json_path")]
    pub config_json_path: PathBuf,

    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

/// Which feed source to poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSourceKind {
    #[default]
    Public,
    Authenticated,
    /// Posts read from a local author-feed file, for offline runs
    Stub,
}

impl FeedSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedSourceKind::Public => "public",
            FeedSourceKind::Authenticated => "authenticated",
            FeedSourceKind::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub source: FeedSourceKind,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_pds_base_url")]
    pub pds_base_url: String,

    #[serde(default = "default_web_base_url")]
    pub web_base_url: String,

    /// Author-feed JSON served by the stub source
    #[serde(default)]
    pub stub_feed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_discord_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Users allowed to post manual fetches publicly
    #[serde(default)]
    pub admin_user_ids: Vec<String>,

    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_config_json_path() -> PathBuf {
    PathBuf::from("./config.json")
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("./state.sqlite")
}

fn default_poll_interval() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_public_base_url() -> String {
    skyrelay_adapters::bluesky::PUBLIC_API_BASE_URL.to_string()
}

fn default_pds_base_url() -> String {
    skyrelay_adapters::bluesky::PDS_BASE_URL.to_string()
}

fn default_web_base_url() -> String {
    "https://bsky.app".to_string()
}

fn default_discord_api_base_url() -> String {
    skyrelay_adapters::discord::API_BASE_URL.to_string()
}

fn default_bot_token_env() -> String {
    "DISCORD_BOT_TOKEN".to_string()
}

fn default_delivery_timeout() -> u64 {
    30
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            config_json_path: default_config_json_path(),
            state_db_path: default_state_db_path(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: FeedSourceKind::default(),
            public_base_url: default_public_base_url(),
            pds_base_url: default_pds_base_url(),
            web_base_url: default_web_base_url(),
            stub_feed_path: None,
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_discord_api_base_url(),
            bot_token_env: default_bot_token_env(),
            admin_user_ids: vec![],
            timeout_secs: default_delivery_timeout(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

impl DiscordConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|id| id == user_id)
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./skyrelay.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("SKYRELAY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Discord bot token from the configured environment variable
    pub fn load_bot_token(&self) -> Result<SecretString> {
        load_secret(&self.discord.bot_token_env, "discord")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# skyrelay configuration

[general]
# Channel, account and encrypted credentials written by `skyrelay setup`
config_json_path = "./config.json"
state_db_path = "./state.sqlite"

[poll]
interval_secs = 300
fetch_timeout_secs = 30

[feed]
source = "public"  # public, authenticated, stub
public_base_url = "https://public.api.bsky.app"
pds_base_url = "https://bsky.social"
web_base_url = "https://bsky.app"
# stub_feed_path = "./feed.json"

[discord]
api_base_url = "https://discord.com/api/v10"
bot_token_env = "DISCORD_BOT_TOKEN"
# Users allowed to run `getpost --public --user <id>`
admin_user_ids = []
timeout_secs = 30
"#
        .to_string()
    }
}

pub fn load_secret(env_var: &str, purpose: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No environment variable configured for {}", purpose);
    }

    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::new(value.into())),
        _ => bail!(
            "Environment variable {} is not set (needed for {})",
            env_var,
            purpose
        ),
    }
}
