use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EcoAgentError, Result};
use crate::solar::SolarSettings;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 300_000;

/// Main configuration loaded from eco_agents.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub solar: SolarSettings,
    pub server: ServerConfig,
    pub ocr: OcrConfig,
}

/// Hosted model access and the ordered candidate list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Only ever read from `GEMINI_API_KEY`
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub candidates: Vec<String>,
    pub vision_model: String,
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            candidates: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
                "gemini-pro".to_string(),
            ],
            vision_model: "gemini-1.5-flash".to_string(),
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Include error details in HTTP error bodies
    pub debug: bool,
    /// Image analysed by `POST /api/test`
    pub sample_image: String,
    pub max_upload_bytes: usize,
    /// Where uploads are spooled for analysis; the system temp dir when unset
    pub upload_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            debug: false,
            sample_image: "A_bag_of_chpis.png".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            upload_dir: None,
        }
    }
}

/// Local OCR used when the vision model cannot read an image
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    /// tesseract executable, resolved through PATH unless absolute
    pub binary: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    /// Uses ECO_AGENTS_CONFIG or defaults to "eco_agents.toml".
    pub fn load() -> anyhow::Result<Self> {
        // ECO_ENV_FILE if set, otherwise ./.env
        if let Ok(env_path) = std::env::var("ECO_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path =
            std::env::var("ECO_AGENTS_CONFIG").unwrap_or_else(|_| "eco_agents.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            toml::from_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides; `lookup` returns the raw value of a variable
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        self.model.api_key = non_empty("GEMINI_API_KEY");
        if let Some(url) = non_empty("ECO_MODEL_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(list) = non_empty("ECO_MODEL_CANDIDATES") {
            self.model.candidates = list
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(model) = non_empty("ECO_VISION_MODEL") {
            self.model.vision_model = model;
        }
        if let Some(ms) = non_empty("ECO_MODEL_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.model.timeout_ms = ms;
        }
        if let Some(bind) = non_empty("ECO_HTTP_BIND") {
            self.server.bind = bind;
        }
        if let Some(debug) = non_empty("ECO_DEBUG").and_then(|v| parse_bool(&v)) {
            self.server.debug = debug;
        }
        if let Some(path) = non_empty("ECO_SAMPLE_IMAGE") {
            self.server.sample_image = path;
        }
        if let Some(dir) = non_empty("ECO_UPLOAD_DIR") {
            self.server.upload_dir = Some(PathBuf::from(dir));
        }
        if let Some(binary) = non_empty("TESSERACT_BIN") {
            self.ocr.binary = binary;
        }
    }

    /// Reject unusable settings; clamps the model timeout into range
    pub fn validate(&mut self) -> Result<()> {
        let invalid = |message: String| Err(EcoAgentError::Config { message });
        if self.model.candidates.is_empty() {
            return invalid("model.candidates must name at least one model".to_string());
        }
        if self.model.vision_model.trim().is_empty() {
            return invalid("model.vision_model must not be empty".to_string());
        }
        if self.ocr.binary.trim().is_empty() {
            return invalid("ocr.binary must not be empty".to_string());
        }
        if !(self.solar.battery_capacity_wh.is_finite() && self.solar.battery_capacity_wh > 0.0) {
            return invalid(format!(
                "solar.battery_capacity_wh must be > 0, got {}",
                self.solar.battery_capacity_wh
            ));
        }
        let clamped = self.model.timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        if clamped != self.model.timeout_ms {
            tracing::warn!(
                "model.timeout_ms {} out of range; using {}",
                self.model.timeout_ms,
                clamped
            );
            self.model.timeout_ms = clamped;
        }
        if self.model.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; model calls will use local fallbacks");
        }
        Ok(())
    }
}
