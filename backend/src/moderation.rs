//! Content moderation seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModerationConfig;
use crate::gateway::TransportError;
use crate::gateway::transport::RetryingTransport;

/// Verdict meaning the text may be dispatched.
pub const PASS: &str = "pass";

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("Text rejected by moderation (suggestion: {suggestion})")]
    Rejected { suggestion: String },

    #[error("Moderation service failed: {0}")]
    Service(#[from] TransportError),
}

#[async_trait]
pub trait Moderation: Send + Sync {
    /// Ok when the text may be dispatched.
    async fn check_text(&self, text: &str) -> Result<(), ModerationError>;
}

/// Accepts every text. Used when no moderation endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Moderation for PassThrough {
    async fn check_text(&self, _text: &str) -> Result<(), ModerationError> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CheckTextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckTextResponse {
    #[serde(default)]
    suggestion: String,
}

/// Moderation endpoint reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpModeration {
    transport: RetryingTransport,
    url: String,
}

impl HttpModeration {
    pub fn new(url: impl Into<String>, config: &ModerationConfig) -> Result<Self, TransportError> {
        Ok(Self {
            transport: RetryingTransport::new(config.timeout(), config.max_retries)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Moderation for HttpModeration {
    async fn check_text(&self, text: &str) -> Result<(), ModerationError> {
        let resp: CheckTextResponse = self
            .transport
            .post_json(&self.url, Some(&CheckTextRequest { text }))
            .await?;

        if resp.suggestion != PASS {
            tracing::info!(suggestion = %resp.suggestion, "Moderation rejected text");
            return Err(ModerationError::Rejected {
                suggestion: resp.suggestion,
            });
        }
        Ok(())
    }
}

/// Build the configured moderation backend.
pub fn from_config(config: &ModerationConfig) -> Result<Arc<dyn Moderation>, TransportError> {
    match &config.url {
        Some(url) => {
            tracing::info!(url = %url, "Using HTTP moderation");
            Ok(Arc::new(HttpModeration::new(url.clone(), config)?))
        }
        None => {
            tracing::info!("No moderation endpoint configured, all text passes");
            Ok(Arc::new(PassThrough))
        }
    }
}
