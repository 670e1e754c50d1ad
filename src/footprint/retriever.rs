//! Footprint lookup as an ordered decision chain.
//!
//! Sources are asked in order and the first hit wins; `Ok(None)` means "not
//! found, try the next one", while `Err` aborts retrieval. The category average
//! terminates the chain and always answers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::footprint::{
    Category, Components, Confidence, FootprintData, RetrievedFootprint, StandardizedEntity,
};

pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &str;
    fn lookup(&self, entity: &StandardizedEntity) -> Result<Option<RetrievedFootprint>>;
}

#[derive(Debug, Clone)]
struct DatabaseEntry {
    data: FootprintData,
    source: &'static str,
    confidence: Confidence,
}

/// Curated table keyed by lower-cased canonical name
#[derive(Debug, Clone)]
pub struct InternalDatabase {
    entries: HashMap<String, DatabaseEntry>,
}

impl Default for InternalDatabase {
    fn default() -> Self {
        let entries = [
            (
                "coca-cola, 0.5l, pet bottle",
                DatabaseEntry {
                    data: FootprintData::Total { co2e_kg: 0.17 },
                    source: "Internal DB (EcoInvent)",
                    confidence: Confidence::High,
                },
            ),
            (
                "t-shirt, cotton, blue, large",
                DatabaseEntry {
                    data: FootprintData::Total { co2e_kg: 6.8 },
                    source: "Internal DB (OpenApparel)",
                    confidence: Confidence::High,
                },
            ),
            (
                "t-shirt, cotton, made in india",
                DatabaseEntry {
                    data: FootprintData::Components {
                        components: Components {
                            production_impact: 5.5,
                            packaging_impact: 0.3,
                            transport_impact: 1.0,
                        },
                    },
                    source: "Internal LCA DB",
                    confidence: Confidence::High,
                },
            ),
        ];
        Self {
            entries: entries
                .into_iter()
                .map(|(name, entry)| (name.to_string(), entry))
                .collect(),
        }
    }
}

impl KnowledgeSource for InternalDatabase {
    fn name(&self) -> &str {
        "internal database"
    }

    fn lookup(&self, entity: &StandardizedEntity) -> Result<Option<RetrievedFootprint>> {
        let key = entity.canonical_name.trim().to_lowercase();
        Ok(self.entries.get(&key).map(|entry| RetrievedFootprint {
            canonical_name: entity.canonical_name.clone(),
            category: entity.category,
            data: entry.data,
            source: entry.source.to_string(),
            confidence: entry.confidence,
            notes: None,
        }))
    }
}

/// Stand-in for scraping published LCA figures; matches by substring
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedWebSearch;

impl KnowledgeSource for SimulatedWebSearch {
    fn name(&self) -> &str {
        "web search"
    }

    fn lookup(&self, entity: &StandardizedEntity) -> Result<Option<RetrievedFootprint>> {
        if !entity
            .canonical_name
            .to_lowercase()
            .contains("lay's classic potato chips")
        {
            return Ok(None);
        }
        Ok(Some(RetrievedFootprint {
            canonical_name: entity.canonical_name.clone(),
            category: entity.category,
            data: FootprintData::Total { co2e_kg: 0.075 },
            source: "Simulated Web Scrape (GoodFood Institute Report)".to_string(),
            confidence: Confidence::Medium,
            notes: Some("Based on potato farming, processing, and packaging.".to_string()),
        }))
    }
}

/// Low-confidence per-category averages (kg CO2e per item; per passenger-km for flights)
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryAverages;

impl CategoryAverages {
    pub const GENERIC_AVERAGE: f64 = 5.0;
    pub const SOURCE: &'static str = "Category Fallback Heuristic";

    pub fn average(category: Category) -> f64 {
        match category {
            Category::Food => 1.5,
            Category::Beverage => 0.5,
            Category::Clothing => 7.0,
            Category::Electronics => 25.0,
            Category::Flights => 0.115,
            Category::Other => 5.0,
            Category::Error => Self::GENERIC_AVERAGE,
        }
    }

    pub fn estimate(&self, entity: &StandardizedEntity) -> RetrievedFootprint {
        RetrievedFootprint {
            canonical_name: entity.canonical_name.clone(),
            category: entity.category,
            data: FootprintData::Total {
                co2e_kg: Self::average(entity.category),
            },
            source: Self::SOURCE.to_string(),
            confidence: Confidence::Low,
            notes: None,
        }
    }
}

pub struct KnowledgeRetriever {
    sources: Vec<Arc<dyn KnowledgeSource>>,
    fallback: CategoryAverages,
}

impl Default for KnowledgeRetriever {
    fn default() -> Self {
        let sources: Vec<Arc<dyn KnowledgeSource>> = vec![
            Arc::new(InternalDatabase::default()),
            Arc::new(SimulatedWebSearch),
        ];
        Self::with_sources(sources)
    }
}

impl KnowledgeRetriever {
    pub fn with_sources(sources: Vec<Arc<dyn KnowledgeSource>>) -> Self {
        Self {
            sources,
            fallback: CategoryAverages,
        }
    }

    pub fn retrieve(&self, entity: &StandardizedEntity) -> Result<RetrievedFootprint> {
        if entity.is_sentinel() {
            info!(
                "Standardization failed ('{}'); using generic average",
                entity.canonical_name
            );
            return Ok(self.fallback.estimate(entity));
        }

        for source in &self.sources {
            debug!("Looking up '{}' in {}", entity.canonical_name, source.name());
            if let Some(found) = source.lookup(entity)? {
                info!("Found '{}' in {}", entity.canonical_name, source.name());
                return Ok(found);
            }
        }

        info!(
            "No source knew '{}'; using {} average",
            entity.canonical_name, entity.category
        );
        Ok(self.fallback.estimate(entity))
    }
}
