use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::clients::traits::{GenerateRequest, ModelBackend, ModelError, ModelReply};
use crate::config::{DEFAULT_GEMINI_BASE_URL, ModelConfig};
use crate::error::EcoAgentError;

const ERROR_BODY_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Serialize)]
struct GenerateContentBody<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineBlob<'a> },
}

#[derive(Debug, Serialize)]
struct InlineBlob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// REST client for the hosted Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EcoAgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, EcoAgentError> {
        Self::new(
            config.api_key.clone(),
            Some(config.base_url.clone()),
            Duration::from_millis(config.timeout_ms),
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<ModelReply, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::NotConfigured("GEMINI_API_KEY is not set".to_string()))?;

        let mut parts = vec![RequestPart::Text {
            text: &request.prompt,
        }];
        if let Some(image) = &request.image {
            parts.push(RequestPart::InlineData {
                inline_data: InlineBlob {
                    mime_type: &image.mime_type,
                    data: BASE64.encode(&image.data),
                },
            });
        }
        let body = GenerateContentBody {
            contents: vec![RequestContent { parts }],
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ModelError::RateLimited {
                model: model.to_string(),
            });
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                model: model.to_string(),
                status: status.as_u16(),
                body: error_text.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Unreadable(e.to_string()))?;
        let text = extract_text(parsed).ok_or_else(|| ModelError::EmptyResponse {
            model: model.to_string(),
        })?;

        Ok(ModelReply {
            model: model.to_string(),
            text,
        })
    }
}

fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::traits::InlineImage;

    #[test]
    fn request_body_serializes_text_and_image_parts() {
        let image = InlineImage {
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        };
        let parts = vec![
            RequestPart::Text { text: "describe" },
            RequestPart::InlineData {
                inline_data: InlineBlob {
                    mime_type: &image.mime_type,
                    data: BASE64.encode(&image.data),
                },
            },
        ];
        let body = GenerateContentBody {
            contents: vec![RequestContent { parts }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "AQID");
    }

    #[test]
    fn extract_text_joins_parts_of_first_candidate() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(parsed).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn extract_text_rejects_empty_candidates() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(parsed).is_none());
    }

    #[tokio::test]
    async fn missing_api_key_is_not_configured() {
        let backend = GeminiBackend::new(None, None, Duration::from_secs(1)).unwrap();
        let err = backend
            .generate("gemini-1.5-flash", &GenerateRequest::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured(_)));
        assert!(err.aborts_candidates());
    }

    #[test]
    fn endpoint_uses_model_name() {
        let backend = GeminiBackend::new(
            Some("k".into()),
            Some("http://localhost:9/v1beta/".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            backend.endpoint("gemini-1.5-pro"),
            "http://localhost:9/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }
}
