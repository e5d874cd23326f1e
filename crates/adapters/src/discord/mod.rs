//! Discord REST adapter: channel messages and channel lookup

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use skyrelay_domain::usecases::{PostCard, Renderer};
use skyrelay_domain::{
    Delivery, DeliveryError, DeliveryOptions, Destination, DestinationValidator, NormalizedPost,
    Publisher,
};
use std::time::Duration;

pub const API_BASE_URL: &str = "https://discord.com/api/v10";

/// Posts normalized posts as embeds through a bot account
pub struct DiscordPublisher {
    client: Client,
    bot_token: SecretString,
    base_url: String,
    renderer: Renderer,
}

impl DiscordPublisher {
    pub fn new(bot_token: SecretString, renderer: Renderer, timeout: Duration) -> Self {
        Self::with_base_url(bot_token, API_BASE_URL.to_string(), renderer, timeout)
    }

    pub fn with_base_url(
        bot_token: SecretString,
        base_url: String,
        renderer: Renderer,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            bot_token,
            base_url,
            renderer,
        }
    }

    fn channel_url(&self, destination: &Destination) -> String {
        format!(
            "{}/channels/{}",
            self.base_url.trim_end_matches('/'),
            destination.channel_id()
        )
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token.expose_secret())
    }
}

#[derive(Serialize)]
struct CreateMessageRequest {
    content: String,
    embeds: Vec<Embed>,
    allowed_mentions: AllowedMentions,
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: Vec<String>,
}

#[derive(Serialize)]
struct Embed {
    title: String,
    url: String,
    description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    timestamp: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedMedia>,
    fields: Vec<EmbedField>,
}

#[derive(Serialize)]
struct EmbedMedia {
    url: String,
}

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    guild_id: Option<String>,
    channel_id: String,
}

impl From<PostCard> for CreateMessageRequest {
    fn from(card: PostCard) -> Self {
        let embed = Embed {
            title: card.title,
            url: card.url,
            description: card.description,
            timestamp: card.timestamp,
            color: card.color,
            thumbnail: card.thumbnail_url.map(|url| EmbedMedia { url }),
            image: card.image_url.map(|url| EmbedMedia { url }),
            fields: card
                .fields
                .into_iter()
                .map(|field| EmbedField {
                    name: field.name,
                    value: field.value,
                    inline: false,
                })
                .collect(),
        };

        Self {
            content: card.content,
            embeds: vec![embed],
            allowed_mentions: AllowedMentions { parse: vec![] },
        }
    }
}

/// Map non-success responses onto delivery errors
async fn check_status(
    response: Response,
    destination: &Destination,
) -> Result<Response, DeliveryError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(DeliveryError::Auth("Invalid bot token".to_string())),
        StatusCode::FORBIDDEN => Err(DeliveryError::Forbidden(destination.to_string())),
        StatusCode::NOT_FOUND => Err(DeliveryError::NotFound(destination.to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(DeliveryError::RateLimited),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Api(format!("HTTP {}: {}", status.as_u16(), body)))
        }
    }
}

#[async_trait]
impl Publisher for DiscordPublisher {
    /// Channel messages are always public; hidden deliveries are routed elsewhere
    async fn deliver(
        &self,
        post: &NormalizedPost,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Delivery, DeliveryError> {
        if !options.visible_to_all {
            tracing::warn!(post_id = %post.id, "Hidden delivery sent to a public channel");
        }

        let request = CreateMessageRequest::from(self.renderer.card(post, options.notice));
        let url = format!("{}/messages", self.channel_url(destination));

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization())
            .json(&request)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let message: MessageResponse = check_status(response, destination)
            .await?
            .json()
            .await
            .map_err(|e| DeliveryError::Api(e.to_string()))?;

        let url = message.guild_id.as_ref().map(|guild| {
            format!(
                "https://discord.com/channels/{}/{}/{}",
                guild, message.channel_id, message.id
            )
        });

        Ok(Delivery {
            id: message.id,
            url,
        })
    }

    fn platform(&self) -> &'static str {
        "discord"
    }
}

#[async_trait]
impl DestinationValidator for DiscordPublisher {
    async fn check(&self, destination: &Destination) -> Result<bool, DeliveryError> {
        let response = self
            .client
            .get(self.channel_url(destination))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        match check_status(response, destination).await {
            Ok(_) => Ok(true),
            // The bot cannot see the channel
            Err(DeliveryError::NotFound(_) | DeliveryError::Forbidden(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }
}
