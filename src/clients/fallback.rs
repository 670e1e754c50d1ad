//! Ordered multi-model fallback on top of a [`ModelBackend`].
//!
//! Candidates are tried in priority order. A rate limit (or a missing credential)
//! stops the walk at once; any other failure moves on to the next model. When no
//! candidate produced text the client hands back a locally simulated response if a
//! simulator is attached, otherwise an explicit `Unavailable` marker.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::clients::traits::{GenerateRequest, ModelBackend, ModelError, ModelReply};
use crate::utils::truncate_chars;

const PROMPT_PREVIEW_CHARS: usize = 200;

/// Produces a deterministic stand-in response from the prompt text alone
pub trait ResponseSimulator: Send + Sync {
    fn simulate(&self, prompt: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RateLimited,
    NotConfigured,
    CandidatesExhausted,
}

/// What one `generate_content` call yielded
#[derive(Debug, Clone, PartialEq)]
pub enum RawModelOutput {
    Generated(ModelReply),
    Simulated { reason: FallbackReason, text: String },
    Unavailable { reason: FallbackReason },
}

impl RawModelOutput {
    pub fn text(&self) -> Option<&str> {
        match self {
            RawModelOutput::Generated(reply) => Some(&reply.text),
            RawModelOutput::Simulated { text, .. } => Some(text),
            RawModelOutput::Unavailable { .. } => None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, RawModelOutput::Simulated { .. })
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            RawModelOutput::Generated(reply) => Some(&reply.model),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    candidates: Vec<String>,
    simulator: Option<Arc<dyn ResponseSimulator>>,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("candidates", &self.candidates)
            .field("simulator", &self.simulator.is_some())
            .finish()
    }
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ModelBackend>, candidates: Vec<String>) -> Self {
        Self {
            backend,
            candidates,
            simulator: None,
        }
    }

    pub fn with_simulator(mut self, simulator: Arc<dyn ResponseSimulator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Same backend, different candidate list (e.g. a vision-capable model only)
    pub fn with_candidates(&self, candidates: Vec<String>) -> Self {
        Self {
            backend: self.backend.clone(),
            candidates,
            simulator: self.simulator.clone(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub async fn generate_content(&self, prompt: &str) -> RawModelOutput {
        self.generate(&GenerateRequest::text(prompt)).await
    }

    pub async fn generate(&self, request: &GenerateRequest) -> RawModelOutput {
        info!(
            "Sending prompt to model ({} candidates): {}",
            self.candidates.len(),
            truncate_chars(&request.prompt, PROMPT_PREVIEW_CHARS)
        );

        let mut reason = FallbackReason::CandidatesExhausted;
        for model in &self.candidates {
            match self.backend.generate(model, request).await {
                Ok(reply) => {
                    info!("Successfully used model: {}", model);
                    return RawModelOutput::Generated(reply);
                }
                Err(ModelError::RateLimited { .. }) => {
                    warn!("Quota exceeded for model {}; skipping remaining candidates", model);
                    reason = FallbackReason::RateLimited;
                    break;
                }
                Err(ModelError::NotConfigured(msg)) => {
                    warn!("Model backend not configured ({}); skipping remaining candidates", msg);
                    reason = FallbackReason::NotConfigured;
                    break;
                }
                Err(e) => {
                    warn!("Model {} failed: {}", model, e);
                }
            }
        }

        match &self.simulator {
            Some(simulator) => {
                warn!("No model response ({:?}); using simulated response", reason);
                RawModelOutput::Simulated {
                    reason,
                    text: simulator.simulate(&request.prompt),
                }
            }
            None => {
                warn!("No model response ({:?}); caller fallback applies", reason);
                RawModelOutput::Unavailable { reason }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    struct EchoSimulator;

    impl ResponseSimulator for EchoSimulator {
        fn simulate(&self, prompt: &str) -> String {
            format!("simulated:{}", prompt.len())
        }
    }

    fn candidates() -> Vec<String> {
        vec!["flash".into(), "pro".into(), "legacy".into()]
    }

    #[tokio::test]
    async fn first_success_wins() {
        let backend = Arc::new(ScriptedBackend::new().push("flash", Ok("hello")));
        let client = ModelClient::new(backend.clone(), candidates());
        let out = client.generate_content("p").await;
        assert_eq!(out.text(), Some("hello"));
        assert_eq!(out.model(), Some("flash"));
        assert_eq!(backend.calls(), vec!["flash"]);
    }

    #[tokio::test]
    async fn non_success_status_advances_to_next_candidate() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .push(
                    "flash",
                    Err(ModelError::Status {
                        model: "flash".into(),
                        status: 404,
                        body: "not found".into(),
                    }),
                )
                .push("pro", Err(ModelError::Transport("reset".into())))
                .push("legacy", Ok("third time")),
        );
        let client = ModelClient::new(backend.clone(), candidates());
        let out = client.generate_content("p").await;
        assert_eq!(out.text(), Some("third time"));
        assert_eq!(backend.calls(), vec!["flash", "pro", "legacy"]);
    }

    #[tokio::test]
    async fn rate_limit_aborts_remaining_candidates() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .push("flash", Err(ModelError::RateLimited { model: "flash".into() }))
                .push("pro", Ok("never reached")),
        );
        let client =
            ModelClient::new(backend.clone(), candidates()).with_simulator(Arc::new(EchoSimulator));
        let out = client.generate_content("abc").await;
        assert_eq!(
            out,
            RawModelOutput::Simulated {
                reason: FallbackReason::RateLimited,
                text: "simulated:3".into()
            }
        );
        assert_eq!(backend.calls(), vec!["flash"]);
    }

    #[tokio::test]
    async fn exhausted_candidates_simulate_when_possible() {
        let backend = Arc::new(ScriptedBackend::failing(ModelError::Transport("down".into())));
        let client =
            ModelClient::new(backend.clone(), candidates()).with_simulator(Arc::new(EchoSimulator));
        let out = client.generate_content("abcd").await;
        assert!(out.is_simulated());
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_candidates_without_simulator_are_unavailable() {
        let backend = Arc::new(ScriptedBackend::failing(ModelError::Transport("down".into())));
        let client = ModelClient::new(backend, candidates());
        let out = client.generate_content("p").await;
        assert_eq!(
            out,
            RawModelOutput::Unavailable {
                reason: FallbackReason::CandidatesExhausted
            }
        );
        assert!(out.text().is_none());
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit() {
        let backend = Arc::new(ScriptedBackend::failing(ModelError::NotConfigured(
            "no key".into(),
        )));
        let client = ModelClient::new(backend.clone(), candidates());
        let out = client.generate_content("p").await;
        assert_eq!(
            out,
            RawModelOutput::Unavailable {
                reason: FallbackReason::NotConfigured
            }
        );
        assert_eq!(backend.calls(), vec!["flash"]);
    }
}
