use serde::Deserialize;
use tracing::{info, warn};

use crate::clients::ModelClient;
use crate::footprint::{Category, ExtractedRecord, StandardizedEntity};
use crate::parsing::parse_model_json;

/// Both keys must be present; anything else in the reply is ignored
#[derive(Debug, Deserialize)]
struct EntityReply {
    canonical_name: String,
    category: String,
}

/// Normalises an extracted record into a canonical name and a fixed category
#[derive(Debug, Clone)]
pub struct EntityStandardizer {
    client: ModelClient,
}

impl EntityStandardizer {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    pub fn build_prompt(record: &ExtractedRecord) -> String {
        let categories = Category::ASSIGNABLE
            .iter()
            .map(|c| format!("'{}'", c))
            .collect::<Vec<_>>()
            .join(", ");
        let input = serde_json::to_string(record).unwrap_or_default();

        format!(
            r#"You are a highly accurate data processing engine. Your task is to analyze the user's input JSON object and perform two steps:

**Step 1: Create a Canonical Name**
Intelligently combine the most important fields from the JSON to create a single, standardized, and human-readable product name. Extract key attributes like brand, product type, specifications, and routes.
- For a product photo, combine brand, product name, and a key specification like weight.
- For a flight, describe the route clearly.
- For a grocery list, name the most significant item.

**Step 2: Categorize the Entity**
Map the entity to one of the following predefined categories:
[{categories}]

**Output Format:**
You MUST provide your final answer in a single, valid JSON object. The JSON object must have exactly two keys:
1. "canonical_name": The standardized name from Step 1.
2. "category": The category assigned in Step 2.

Do not add any explanations or introductory text outside of the JSON object.

**Input JSON:**
{input}"#
        )
    }

    /// Never fails: unusable model output yields a sentinel entity with category `Error`
    pub async fn standardize(&self, record: &ExtractedRecord) -> StandardizedEntity {
        let output = self.client.generate_content(&Self::build_prompt(record)).await;
        let Some(text) = output.text() else {
            warn!("Standardization model unavailable; returning sentinel");
            return StandardizedEntity::sentinel(StandardizedEntity::API_FAILED);
        };

        match parse_model_json::<EntityReply>(text) {
            Ok(reply) => {
                let category = Category::coerce(&reply.category);
                if category.as_str() != reply.category.trim() {
                    warn!(
                        "Unrecognized category '{}' coerced to {}",
                        reply.category, category
                    );
                }
                let entity = StandardizedEntity {
                    canonical_name: reply.canonical_name.trim().to_string(),
                    category,
                };
                info!(
                    "Standardized '{}' as {}",
                    entity.canonical_name, entity.category
                );
                entity
            }
            Err(e) => {
                warn!("Could not parse standardization reply: {}", e);
                StandardizedEntity::sentinel(StandardizedEntity::PARSE_FAILED)
            }
        }
    }
}
