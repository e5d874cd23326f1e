//! Outbox publisher: appends deliveries as JSON lines instead of posting them.

use async_trait::async_trait;
use serde::Serialize;
use skyrelay_domain::{
    Delivery, DeliveryError, DeliveryOptions, Destination, NormalizedPost, Publisher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    writer: OutboxWriter,
}

impl OutboxPublisher {
    pub fn new(writer: OutboxWriter) -> Self {
        Self { writer }
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    delivery_id: &'a str,
    channel_id: &'a str,
    visible_to_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<&'a str>,
    post: &'a NormalizedPost,
}

#[async_trait]
impl Publisher for OutboxPublisher {
    async fn deliver(
        &self,
        post: &NormalizedPost,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Delivery, DeliveryError> {
        let id = Uuid::new_v4().to_string();
        let entry = OutboxEntry {
            delivery_id: &id,
            channel_id: destination.channel_id(),
            visible_to_all: options.visible_to_all,
            notice: options.notice,
            post,
        };

        self.writer
            .append(&entry)
            .await
            .map_err(|error| DeliveryError::Api(format!("Outbox write failed: {}", error)))?;

        tracing::debug!(post_id = %post.id, path = %self.writer.path().display(), "Appended to outbox");

        Ok(Delivery { id, url: None })
    }

    fn platform(&self) -> &'static str {
        "outbox"
    }
}
