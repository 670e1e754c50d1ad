use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::clients::{GenerateRequest, InlineImage, ModelClient, OcrEngine};
use crate::error::{EcoAgentError, Result};
use crate::footprint::{ExtractedRecord, FootprintInput};
use crate::parsing::parse_model_json;

const VISION_PROMPT: &str = r#"Analyze the image and identify its type. Use exactly one of these values for the "type" field: "grocery_receipt", "product_photo", "flight_ticket", or "other".
Extract all relevant entities based on the type.
Return the result as a single, clean JSON object.
- For a "grocery_receipt", extract: "store_name", and a list of "items" with "name", "quantity", and "price".
- For a "product_photo", extract: "product_name", "brand", and potential "materials" or "specifications".
- For a "flight_ticket", extract: "passenger_name", "flight_number", "departure_airport", "arrival_airport", and "date".
If the image content is unclear or doesn't fit these categories, set the "type" to "other" and provide a "description" and any "raw_text" you can extract.
Your entire response must be ONLY the JSON object, without any markdown formatting."#;

/// Turns raw input into an [`ExtractedRecord`]: vision model first, OCR second
pub struct InputExtractor {
    vision: ModelClient,
    ocr: Arc<dyn OcrEngine>,
}

impl InputExtractor {
    /// `vision_model` is the only candidate used for image requests
    pub fn new(client: &ModelClient, vision_model: &str, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            vision: client.with_candidates(vec![vision_model.to_string()]),
            ocr,
        }
    }

    /// Text never touches the model. A missing image file is an error; an image
    /// that neither vision nor OCR can read yields a `Failed` record.
    pub async fn extract(&self, input: &FootprintInput) -> Result<ExtractedRecord> {
        match input {
            FootprintInput::Text(content) => {
                info!("Processing manual text entry");
                Ok(ExtractedRecord::ManualText {
                    content: content.clone(),
                })
            }
            FootprintInput::Image(path) => {
                if !path.is_file() {
                    return Err(EcoAgentError::InvalidParams {
                        message: format!("Image file '{}' not found", path.display()),
                    });
                }
                info!("Processing image file: {}", path.display());
                let bytes = tokio::fs::read(path).await?;

                if let Some(record) = self.with_vision(path, bytes).await {
                    return Ok(record);
                }
                if let Some(record) = self.with_ocr(path).await {
                    return Ok(record);
                }
                Ok(ExtractedRecord::Failed {
                    error: "Failed to process image with all available tools.".to_string(),
                })
            }
        }
    }

    async fn with_vision(&self, path: &Path, bytes: Vec<u8>) -> Option<ExtractedRecord> {
        let image = InlineImage {
            mime_type: mime_for(path).to_string(),
            data: bytes,
        };
        let output = self
            .vision
            .generate(&GenerateRequest::with_image(VISION_PROMPT, image))
            .await;
        let text = output.text()?;

        match parse_model_json::<Value>(text) {
            Ok(value) => {
                let record = ExtractedRecord::from_vision_value(value);
                match &record {
                    Some(r) => info!("Vision extraction succeeded ({})", r.type_tag()),
                    None => warn!("Vision reply was JSON but not an object"),
                }
                record
            }
            Err(e) => {
                warn!("Vision extraction failed: {}", e);
                None
            }
        }
    }

    async fn with_ocr(&self, path: &Path) -> Option<ExtractedRecord> {
        info!("Falling back to {} OCR", self.ocr.name());
        match self.ocr.extract_text(path).await {
            Ok(raw_text) if !raw_text.trim().is_empty() => Some(ExtractedRecord::OcrFallback {
                source: self.ocr.name().to_string(),
                raw_text: raw_text.trim().to_string(),
            }),
            Ok(_) => {
                warn!("{} extracted no text", self.ocr.name());
                None
            }
            Err(e) => {
                warn!("{} processing failed: {}", self.ocr.name(), e);
                None
            }
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
