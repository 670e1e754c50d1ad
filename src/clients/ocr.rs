//! Plain-text OCR through the `tesseract` command-line tool

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::OcrConfig;

const STDERR_CAP_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr executable not found")]
    NotFound,
    #[error("ocr failed: {0}")]
    Failed(String),
}

/// Extract raw text from an image file
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn extract_text(&self, image_path: &Path) -> Result<String, OcrError>;
}

#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(config.binary.clone())
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "Tesseract"
    }

    async fn extract_text(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.binary)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .arg(image_path)
            .arg("stdout")
            .output()
            .await
            .map_err(map_spawn_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!(
                "{} exit {}: {}",
                self.binary,
                output.status,
                crate::utils::truncate_chars(stderr.trim(), STDERR_CAP_CHARS)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn map_spawn_err(err: std::io::Error) -> OcrError {
    if err.kind() == std::io::ErrorKind::NotFound {
        OcrError::NotFound
    } else {
        OcrError::Failed(err.to_string())
    }
}
