use serde::Deserialize;
use tracing::{info, warn};

use crate::clients::ModelClient;
use crate::deserializers::de_option_f64_forgiving;
use crate::error::{EcoAgentError, Result};
use crate::footprint::{
    Breakdown, Components, FORMULA, FootprintData, FootprintEstimate, RetrievedFootprint,
};
use crate::parsing::parse_model_json;
use crate::utils::round4;

/// Production / packaging / transport shares used when no usable breakdown is proposed
pub const FALLBACK_SPLIT: (f64, f64, f64) = (0.70, 0.20, 0.10);
const SUM_TOLERANCE: f64 = 1e-3;

const NOTE_FROM_SOURCE: &str = "Component breakdown taken from source data.";
const NOTE_AI: &str = "Component breakdown was estimated by AI.";
const NOTE_PARSE_FALLBACK: &str =
    "Component breakdown used fallback percentages due to parsing error.";
const NOTE_INVALID_FALLBACK: &str =
    "Component breakdown used fallback percentages because the proposed components did not add up.";
const NOTE_UNAVAILABLE_FALLBACK: &str =
    "Component breakdown used fallback percentages because the model was unavailable.";

#[derive(Debug, Deserialize)]
struct ProposedBreakdown {
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    production_impact: Option<f64>,
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    packaging_impact: Option<f64>,
    #[serde(default, deserialize_with = "de_option_f64_forgiving")]
    transport_impact: Option<f64>,
}

impl ProposedBreakdown {
    fn components(&self) -> Components {
        Components {
            production_impact: self.production_impact.unwrap_or(0.0),
            packaging_impact: self.packaging_impact.unwrap_or(0.0),
            transport_impact: self.transport_impact.unwrap_or(0.0),
        }
    }
}

/// Sum components into a rounded total and breakdown
pub fn from_components(components: &Components) -> (f64, Breakdown) {
    let total = round4(
        components.production_impact + components.packaging_impact + components.transport_impact,
    );
    (
        total,
        Breakdown {
            production: round4(components.production_impact),
            packaging: round4(components.packaging_impact),
            transport: round4(components.transport_impact),
        },
    )
}

pub fn fallback_components(total_co2e_kg: f64) -> Components {
    let (production, packaging, transport) = FALLBACK_SPLIT;
    Components {
        production_impact: total_co2e_kg * production,
        packaging_impact: total_co2e_kg * packaging,
        transport_impact: total_co2e_kg * transport,
    }
}

/// Components must be non-negative and add up to `total` after 4-decimal rounding
pub fn breakdown_matches(components: &Components, total_co2e_kg: f64) -> bool {
    let parts = [
        components.production_impact,
        components.packaging_impact,
        components.transport_impact,
    ];
    if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return false;
    }
    let sum: f64 = parts.iter().map(|p| round4(*p)).sum();
    (sum - round4(total_co2e_kg)).abs() <= SUM_TOLERANCE
}

/// Turns a retrieved data point into a total with a three-way breakdown
#[derive(Debug, Clone)]
pub struct FootprintEstimator {
    client: ModelClient,
}

impl FootprintEstimator {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    pub fn build_prompt(canonical_name: &str, total_co2e_kg: f64, source: &str) -> String {
        format!(
            r#"You are a Life Cycle Assessment (LCA) expert.
A product, "{canonical_name}", has a known total carbon footprint of {total_co2e_kg} kg CO2e, according to the source: "{source}".

Your task is to provide a plausible, estimated breakdown of this total into the following three components:
1. "production_impact": The CO2e from manufacturing the product itself (e.g., growing potatoes, frying chips).
2. "packaging_impact": The CO2e from the product's packaging (e.g., the chip bag).
3. "transport_impact": The CO2e from average distribution and shipping.

The sum of your three estimated components MUST equal the total of {total_co2e_kg} kg.

Provide your answer ONLY as a valid JSON object with the keys "production_impact", "packaging_impact", and "transport_impact". Do not add any other text.

Example output for a different product:
{{
    "production_impact": 0.1,
    "packaging_impact": 0.05,
    "transport_impact": 0.02
}}"#
        )
    }

    /// Known components are summed without a model call; a bare total is split
    /// by the model when its proposal validates, otherwise 70/20/10.
    pub async fn estimate(&self, retrieved: &RetrievedFootprint) -> Result<FootprintEstimate> {
        let (components, notes) = match retrieved.data {
            FootprintData::Components { components } => {
                info!("Using known component breakdown for '{}'", retrieved.canonical_name);
                let notes = retrieved
                    .notes
                    .clone()
                    .unwrap_or_else(|| NOTE_FROM_SOURCE.to_string());
                (components, notes)
            }
            FootprintData::Total { co2e_kg } => {
                if !co2e_kg.is_finite() || co2e_kg < 0.0 {
                    return Err(EcoAgentError::Validation {
                        message: format!("co2e_kg must be a non-negative number, got {}", co2e_kg),
                    });
                }
                let (components, note) = self.split_total(retrieved, co2e_kg).await;
                (components, note.to_string())
            }
        };

        let (total_co2e_kg, breakdown) = from_components(&components);
        info!(
            "Footprint for '{}': {} kg CO2e",
            retrieved.canonical_name, total_co2e_kg
        );
        Ok(FootprintEstimate {
            canonical_name: retrieved.canonical_name.clone(),
            total_co2e_kg,
            breakdown,
            formula: FORMULA.to_string(),
            notes,
            source: retrieved.source.clone(),
            confidence: retrieved.confidence,
        })
    }

    async fn split_total(
        &self,
        retrieved: &RetrievedFootprint,
        total_co2e_kg: f64,
    ) -> (Components, &'static str) {
        let prompt = Self::build_prompt(&retrieved.canonical_name, total_co2e_kg, &retrieved.source);
        let output = self.client.generate_content(&prompt).await;
        let Some(text) = output.text() else {
            warn!("Breakdown model unavailable; using fallback split");
            return (fallback_components(total_co2e_kg), NOTE_UNAVAILABLE_FALLBACK);
        };

        match parse_model_json::<ProposedBreakdown>(text) {
            Ok(proposed) => {
                let components = proposed.components();
                if breakdown_matches(&components, total_co2e_kg) {
                    (components, NOTE_AI)
                } else {
                    warn!(
                        "Proposed breakdown {:?} does not sum to {}; using fallback split",
                        components, total_co2e_kg
                    );
                    (fallback_components(total_co2e_kg), NOTE_INVALID_FALLBACK)
                }
            }
            Err(e) => {
                warn!("Could not parse breakdown: {}", e);
                (fallback_components(total_co2e_kg), NOTE_PARSE_FALLBACK)
            }
        }
    }
}
