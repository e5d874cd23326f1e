//! Console publisher: prints posts for the person at the terminal

use async_trait::async_trait;
use skyrelay_domain::usecases::Renderer;
use skyrelay_domain::{
    Delivery, DeliveryError, DeliveryOptions, Destination, NormalizedPost, Publisher,
};
use std::io::Write;
use std::sync::Mutex;
use uuid::Uuid;

/// Writes the plain-text rendering of each post to a writer (stdout by default)
pub struct ConsolePublisher {
    out: Mutex<Box<dyn Write + Send>>,
    renderer: Renderer,
}

impl ConsolePublisher {
    pub fn stdout(renderer: Renderer) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), renderer)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, renderer: Renderer) -> Self {
        Self {
            out: Mutex::new(out),
            renderer,
        }
    }
}

#[async_trait]
impl Publisher for ConsolePublisher {
    async fn deliver(
        &self,
        post: &NormalizedPost,
        _destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Delivery, DeliveryError> {
        let mut text = self.renderer.plain_text(post);
        if let Some(notice) = options.notice {
            text = format!("### {}\n{}", notice, text);
        }

        let mut out = self
            .out
            .lock()
            .map_err(|e| DeliveryError::Api(format!("Console unavailable: {}", e)))?;
        writeln!(out, "{}\n", text)
            .and_then(|_| out.flush())
            .map_err(|e| DeliveryError::Api(format!("Console write failed: {}", e)))?;

        Ok(Delivery {
            id: Uuid::new_v4().to_string(),
            url: None,
        })
    }

    fn platform(&self) -> &'static str {
        "console"
    }
}
