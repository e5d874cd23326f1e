//! Authenticated feed source: logs in with stored credentials

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use skyrelay_domain::{
    CredentialProvider, Credentials, FeedError, FeedIdentity, FeedSource, RawPost,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{PDS_BASE_URL, check_status, get_latest};

const CREATE_SESSION_PATH: &str = "/xrpc/com.atproto.server.createSession";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    #[serde(default)]
    handle: String,
}

/// Reads author feeds through a logged-in session on the account's PDS
pub struct AuthenticatedFeedSource {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    access_token: Mutex<Option<SecretString>>,
}

impl AuthenticatedFeedSource {
    pub fn new(credentials: Arc<dyn CredentialProvider>, timeout: Duration) -> Self {
        Self::with_base_url(credentials, PDS_BASE_URL.to_string(), timeout)
    }

    pub fn with_base_url(
        credentials: Arc<dyn CredentialProvider>,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url,
            credentials,
            access_token: Mutex::new(None),
        }
    }

    async fn login(&self) -> Result<SecretString, FeedError> {
        let credentials = self
            .credentials
            .credentials()
            .await
            .map_err(|e| FeedError::Configuration(format!("Cannot read credentials: {}", e)))?
            .ok_or_else(|| {
                FeedError::Configuration(
                    "Bluesky credentials not set; run `skyrelay setup`".to_string(),
                )
            })?;

        self.create_session(&credentials).await
    }

    async fn create_session(&self, credentials: &Credentials) -> Result<SecretString, FeedError> {
        let url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            CREATE_SESSION_PATH
        );

        let response = self
            .client
            .post(&url)
            .json(&CreateSessionRequest {
                identifier: &credentials.identifier,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let session: CreateSessionResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        tracing::info!(handle = %session.handle, "Logged in to Bluesky");
        Ok(SecretString::new(session.access_jwt.into()))
    }

    /// Cached access token, logging in when there is none
    async fn token(&self) -> Result<String, FeedError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.expose_secret().to_string());
        }

        let token = self.login().await?;
        let exposed = token.expose_secret().to_string();
        *cached = Some(token);
        Ok(exposed)
    }
}

#[async_trait]
impl FeedSource for AuthenticatedFeedSource {
    async fn fetch_latest(&self, identity: &FeedIdentity) -> Result<Option<RawPost>, FeedError> {
        let token = self.token().await?;

        match get_latest(&self.client, &self.base_url, identity, Some(&token)).await {
            Err(FeedError::Auth(reason)) => {
                // Expired session: log in again once
                tracing::info!(identity = %identity, reason = %reason, "Session rejected, logging in again");
                self.invalidate().await;
                let token = self.token().await?;
                get_latest(&self.client, &self.base_url, identity, Some(&token)).await
            }
            other => other,
        }
    }

    async fn invalidate(&self) {
        self.access_token.lock().await.take();
    }

    fn variant(&self) -> &'static str {
        "authenticated"
    }
}
