//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eco_agents::clients::{
    GenerateRequest, ModelBackend, ModelError, ModelReply, OcrEngine, OcrError,
};
use eco_agents::config::Config;
use eco_agents::http::{AppState, router};

/// Replays canned replies per model and records every call
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<String, VecDeque<Result<String, ModelError>>>>,
    fallback: Mutex<Option<Result<String, ModelError>>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedBackend {
    pub fn offline() -> Arc<Self> {
        let backend = Self::default();
        *backend.fallback.lock().unwrap() =
            Some(Err(ModelError::NotConfigured("GEMINI_API_KEY not set".into())));
        Arc::new(backend)
    }

    pub fn answering(text: &str) -> Arc<Self> {
        let backend = Self::default();
        *backend.fallback.lock().unwrap() = Some(Ok(text.to_string()));
        Arc::new(backend)
    }

    /// Like `answering`, but every reply takes `delay` to arrive
    pub fn answering_after(text: &str, delay: Duration) -> Arc<Self> {
        let backend = Self::default();
        *backend.fallback.lock().unwrap() = Some(Ok(text.to_string()));
        *backend.delay.lock().unwrap() = Some(delay);
        Arc::new(backend)
    }

    pub fn scripted(script: &[(&str, Result<&str, ModelError>)]) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut replies = backend.replies.lock().unwrap();
            for (model, reply) in script {
                replies
                    .entry(model.to_string())
                    .or_default()
                    .push_back(reply.clone().map(str::to_string));
            }
        }
        Arc::new(backend)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(
        &self,
        model: &str,
        _request: &GenerateRequest,
    ) -> Result<ModelReply, ModelError> {
        self.calls.lock().unwrap().push(model.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .replies
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(|q| q.pop_front());
        scripted
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or_else(|| Err(ModelError::Transport("no scripted reply".into())))
            .map(|text| ModelReply {
                model: model.to_string(),
                text,
            })
    }
}

/// OCR engine that returns fixed text, or fails when given `None`
pub struct FixedOcr(pub Option<&'static str>);

#[async_trait]
impl OcrEngine for FixedOcr {
    fn name(&self) -> &str {
        "FixedOcr"
    }

    async fn extract_text(&self, _image_path: &Path) -> Result<String, OcrError> {
        self.0.map(str::to_string).ok_or(OcrError::NotFound)
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.model.candidates = vec!["gemini-1.5-flash".into(), "gemini-1.5-pro".into()];
    config.server.max_upload_bytes = 1024 * 1024;
    config
}

pub fn app(config: Config, backend: Arc<ScriptedBackend>, ocr: FixedOcr) -> axum::Router {
    router(AppState::new(config, backend, Arc::new(ocr)))
}
