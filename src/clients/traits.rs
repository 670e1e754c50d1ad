use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Image bytes sent alongside a prompt for vision-capable models
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One generation request: a prompt plus an optional image
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

/// Text produced by a single successful model call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelReply {
    pub model: String,
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited by model {model}")]
    RateLimited { model: String },
    #[error("model {model} returned status {status}: {body}")]
    Status {
        model: String,
        status: u16,
        body: String,
    },
    #[error("model {model} returned no text")]
    EmptyResponse { model: String },
    #[error("model backend not configured: {0}")]
    NotConfigured(String),
    #[error("unreadable model response: {0}")]
    Unreadable(String),
}

impl ModelError {
    /// Errors after which trying another candidate model is pointless
    pub fn aborts_candidates(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimited { .. } | ModelError::NotConfigured(_)
        )
    }
}

/// Narrow seam to a hosted language model: send a request to one named model, get text back.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, model: &str, request: &GenerateRequest)
    -> Result<ModelReply, ModelError>;
}
