//! Two-phase JSON recovery from free-form model text.
//!
//! Models are asked for "only JSON" but often wrap it in prose or code fences.
//! Phase one parses the first balanced `{...}` span; phase two parses the whole
//! trimmed text. Failure is reported as a value, never a panic, so every caller
//! can substitute its own fallback.

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::truncate_chars;

const RAW_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("could not parse model output as JSON ({reason}): {raw_preview}")]
pub struct ParseFailure {
    pub reason: String,
    pub raw_preview: String,
}

/// Remove markdown code-fence markers such as ```` ```json ```` and ```` ``` ````
pub fn strip_code_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// First balanced `{...}` span, skipping braces inside JSON strings
pub fn first_json_object(text: &str) -> Option<&str> {
    let mut depth: u32 = 0;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0
                        && let Some(s) = start
                    {
                        return Some(&text[s..idx + 1]);
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse model text into `T` using the brace-matched span, then the whole text
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    let cleaned = strip_code_fences(raw);

    let span_err = match first_json_object(&cleaned) {
        Some(span) => match serde_json::from_str::<T>(span) {
            Ok(value) => return Ok(value),
            Err(e) => Some(e.to_string()),
        },
        None => None,
    };

    match serde_json::from_str::<T>(&cleaned) {
        Ok(value) => Ok(value),
        Err(e) => {
            let reason = match span_err {
                Some(span_err) => format!("object span: {}; whole text: {}", span_err, e),
                None => format!("no JSON object found; whole text: {}", e),
            };
            warn!("Error parsing model response: {}", reason);
            debug!("Raw response was: {}", truncate_chars(raw, RAW_PREVIEW_CHARS));
            Err(ParseFailure {
                reason,
                raw_preview: truncate_chars(raw, RAW_PREVIEW_CHARS),
            })
        }
    }
}
