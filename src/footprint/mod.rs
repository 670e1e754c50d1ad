//! Carbon footprint pipeline: the typed records passed between its five stages.
//!
//! Flow: [`extractor`] (image or text → [`ExtractedRecord`]) → [`standardizer`]
//! ([`StandardizedEntity`]) → [`retriever`] ([`RetrievedFootprint`]) →
//! [`estimator`] ([`FootprintEstimate`]) → [`summary`] (markdown). [`pipeline`]
//! sequences them and stops at the first stage that cannot produce a value.

pub mod estimator;
pub mod extractor;
pub mod pipeline;
pub mod retriever;
pub mod standardizer;
pub mod summary;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use estimator::FootprintEstimator;
pub use extractor::InputExtractor;
pub use pipeline::{FootprintPipeline, PipelineReport, Stage, StageFailure};
pub use retriever::{
    CategoryAverages, InternalDatabase, KnowledgeRetriever, KnowledgeSource, SimulatedWebSearch,
};
pub use standardizer::EntityStandardizer;

pub const FORMULA: &str = "Total = Production + Packaging + Transport";

/// What the pipeline is asked to analyse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FootprintInput {
    Image(PathBuf),
    Text(String),
}

impl FootprintInput {
    /// An argument naming an existing file is an image; anything else is literal text
    pub fn from_arg(arg: &str) -> Self {
        let path = PathBuf::from(arg);
        if path.is_file() {
            FootprintInput::Image(path)
        } else {
            FootprintInput::Text(arg.to_string())
        }
    }
}

/// Structured description of the input, tagged by `type`.
///
/// Vision output is free-form beyond the tag, so the document-type variants keep
/// the remaining fields as a JSON map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractedRecord {
    GroceryReceipt {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    ProductPhoto {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    FlightTicket {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    ManualText {
        content: String,
    },
    OcrFallback {
        source: String,
        raw_text: String,
    },
    Other {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    #[serde(rename = "extraction_failed")]
    Failed {
        error: String,
    },
}

impl ExtractedRecord {
    /// Build a record from a vision reply. The `type` tag is normalised
    /// (`"Grocery Receipt"` → `grocery_receipt`); unknown tags become `other`.
    /// Returns `None` when the value is not an object.
    pub fn from_vision_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let tag = fields
            .remove("type")
            .and_then(|t| t.as_str().map(normalize_tag))
            .unwrap_or_default();

        Some(match tag.as_str() {
            "grocery_receipt" => ExtractedRecord::GroceryReceipt { fields },
            "product_photo" => ExtractedRecord::ProductPhoto { fields },
            "flight_ticket" => ExtractedRecord::FlightTicket { fields },
            _ => {
                if !tag.is_empty() && tag != "other" {
                    fields.insert("reported_type".to_string(), Value::String(tag));
                }
                ExtractedRecord::Other { fields }
            }
        })
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            ExtractedRecord::GroceryReceipt { .. } => "grocery_receipt",
            ExtractedRecord::ProductPhoto { .. } => "product_photo",
            ExtractedRecord::FlightTicket { .. } => "flight_ticket",
            ExtractedRecord::ManualText { .. } => "manual_text",
            ExtractedRecord::OcrFallback { .. } => "ocr_fallback",
            ExtractedRecord::Other { .. } => "other",
            ExtractedRecord::Failed { .. } => "extraction_failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExtractedRecord::Failed { .. })
    }
}

fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Fixed product taxonomy. `Error` is the standardization sentinel and never a real category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Beverage,
    Clothing,
    Electronics,
    Flights,
    Other,
    Error,
}

impl Category {
    /// Categories a model may assign
    pub const ASSIGNABLE: [Category; 6] = [
        Category::Food,
        Category::Beverage,
        Category::Clothing,
        Category::Electronics,
        Category::Flights,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Beverage => "Beverage",
            Category::Clothing => "Clothing",
            Category::Electronics => "Electronics",
            Category::Flights => "Flights",
            Category::Other => "Other",
            Category::Error => "Error",
        }
    }

    /// Case-insensitive match against the assignable set; anything else is `Other`
    pub fn coerce(raw: &str) -> Self {
        let wanted = raw.trim();
        Self::ASSIGNABLE
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizedEntity {
    pub canonical_name: String,
    pub category: Category,
}

impl StandardizedEntity {
    pub const PARSE_FAILED: &'static str = "Error processing JSON";
    pub const API_FAILED: &'static str = "API call failed";

    pub fn sentinel(canonical_name: &str) -> Self {
        Self {
            canonical_name: canonical_name.to_string(),
            category: Category::Error,
        }
    }

    /// True for both "parse failed" and "API failed" results
    pub fn is_sentinel(&self) -> bool {
        self.category == Category::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub production_impact: f64,
    pub packaging_impact: f64,
    pub transport_impact: f64,
}

/// Exactly one of the two shapes a footprint data point can take
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FootprintData {
    Components { components: Components },
    Total { co2e_kg: f64 },
}

/// Output of knowledge retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFootprint {
    pub canonical_name: String,
    pub category: Category,
    #[serde(flatten)]
    pub data: FootprintData,
    pub source: String,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub production: f64,
    pub packaging: f64,
    pub transport: f64,
}

impl Breakdown {
    pub fn sum(&self) -> f64 {
        self.production + self.packaging + self.transport
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintEstimate {
    pub canonical_name: String,
    pub total_co2e_kg: f64,
    pub breakdown: Breakdown,
    pub formula: String,
    pub notes: String,
    pub source: String,
    pub confidence: Confidence,
}
