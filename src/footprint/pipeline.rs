use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::clients::{ModelClient, OcrEngine};
use crate::footprint::{
    EntityStandardizer, ExtractedRecord, FootprintEstimate, FootprintEstimator, FootprintInput,
    InputExtractor, KnowledgeRetriever, summary,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InputProcessing,
    Standardization,
    KnowledgeRetrieval,
    FootprintEstimation,
    FinalSummary,
}

impl Stage {
    pub fn number(self) -> u8 {
        match self {
            Stage::InputProcessing => 1,
            Stage::Standardization => 2,
            Stage::KnowledgeRetrieval => 3,
            Stage::FootprintEstimation => 4,
            Stage::FinalSummary => 5,
        }
    }

    /// Key under which the stage output is stored in the result mapping
    pub fn key(self) -> &'static str {
        match self {
            Stage::InputProcessing => "layer1_input_processing",
            Stage::Standardization => "layer2_standardization",
            Stage::KnowledgeRetrieval => "layer3_knowledge_retrieval",
            Stage::FootprintEstimation => "layer4_footprint_estimation",
            Stage::FinalSummary => "layer5_final_summary",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::InputProcessing => "Input Processing",
            Stage::Standardization => "Entity Standardization",
            Stage::KnowledgeRetrieval => "Knowledge Retrieval",
            Stage::FootprintEstimation => "Footprint Estimation",
            Stage::FinalSummary => "Final Summary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer {} ({})", self.number(), self.title())
    }
}

/// The chain halted; nothing after `stage` ran
#[derive(Debug, Error)]
#[error("{stage} failed: {message}")]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl StageFailure {
    /// `"Layer N (<Stage Name>) failed"`
    pub fn label(&self) -> String {
        format!("{} failed", self.stage)
    }
}

/// Stage outputs keyed by [`Stage::key`], in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PipelineReport {
    stages: Map<String, Value>,
}

impl PipelineReport {
    pub fn get(&self, stage: Stage) -> Option<&Value> {
        self.stages.get(stage.key())
    }

    pub fn summary(&self) -> Option<&str> {
        self.get(Stage::FinalSummary).and_then(Value::as_str)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.stages
    }

    fn record<T: Serialize>(&mut self, stage: Stage, output: &T) -> Result<(), StageFailure> {
        let value = serde_json::to_value(output).map_err(|e| StageFailure {
            stage,
            message: e.to_string(),
        })?;
        self.stages.insert(stage.key().to_string(), value);
        info!("{} complete", stage);
        Ok(())
    }
}

fn halt(stage: Stage, err: impl fmt::Display) -> StageFailure {
    let failure = StageFailure {
        stage,
        message: err.to_string(),
    };
    error!("{}", failure);
    failure
}

/// Runs the five footprint stages in order
pub struct FootprintPipeline {
    extractor: InputExtractor,
    standardizer: EntityStandardizer,
    retriever: KnowledgeRetriever,
    estimator: FootprintEstimator,
}

impl FootprintPipeline {
    pub fn new(client: ModelClient, vision_model: &str, ocr: Arc<dyn OcrEngine>) -> Self {
        Self::from_parts(
            InputExtractor::new(&client, vision_model, ocr),
            EntityStandardizer::new(client.clone()),
            KnowledgeRetriever::default(),
            FootprintEstimator::new(client),
        )
    }

    pub fn from_parts(
        extractor: InputExtractor,
        standardizer: EntityStandardizer,
        retriever: KnowledgeRetriever,
        estimator: FootprintEstimator,
    ) -> Self {
        Self {
            extractor,
            standardizer,
            retriever,
            estimator,
        }
    }

    pub async fn run(&self, input: &FootprintInput) -> Result<PipelineReport, StageFailure> {
        let mut report = PipelineReport::default();

        let record = self
            .extractor
            .extract(input)
            .await
            .map_err(|e| halt(Stage::InputProcessing, e))?;
        if let ExtractedRecord::Failed { error } = &record {
            return Err(halt(Stage::InputProcessing, error));
        }
        report.record(Stage::InputProcessing, &record)?;

        let entity = self.standardizer.standardize(&record).await;
        report.record(Stage::Standardization, &entity)?;

        let retrieved = self
            .retriever
            .retrieve(&entity)
            .map_err(|e| halt(Stage::KnowledgeRetrieval, e))?;
        report.record(Stage::KnowledgeRetrieval, &retrieved)?;

        let estimate: FootprintEstimate = self
            .estimator
            .estimate(&retrieved)
            .await
            .map_err(|e| halt(Stage::FootprintEstimation, e))?;
        report.record(Stage::FootprintEstimation, &estimate)?;

        let rendered = summary::render(&estimate);
        report.record(Stage::FinalSummary, &rendered)?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fallback::testing::ScriptedBackend;
    use crate::clients::{ModelError, OcrError};
    use async_trait::async_trait;
    use std::path::Path;

    struct NoOcr;

    #[async_trait]
    impl OcrEngine for NoOcr {
        fn name(&self) -> &str {
            "NoOcr"
        }

        async fn extract_text(&self, _path: &Path) -> Result<String, OcrError> {
            Err(OcrError::NotFound)
        }
    }

    fn pipeline(backend: ScriptedBackend) -> FootprintPipeline {
        let client = ModelClient::new(Arc::new(backend), vec!["gemini-1.5-flash".into()]);
        FootprintPipeline::new(client, "gemini-1.5-flash", Arc::new(NoOcr))
    }

    #[test]
    fn failure_labels_name_the_stage() {
        let failure = StageFailure {
            stage: Stage::KnowledgeRetrieval,
            message: "boom".into(),
        };
        assert_eq!(failure.label(), "Layer 3 (Knowledge Retrieval) failed");
        assert_eq!(
            failure.to_string(),
            "Layer 3 (Knowledge Retrieval) failed: boom"
        );
    }

    #[tokio::test]
    async fn text_query_runs_all_five_stages() {
        let backend = ScriptedBackend::new()
            .push(
                "gemini-1.5-flash",
                Ok(r#"{"canonical_name": "Lay's Classic Potato Chips (1 oz)", "category": "Food"}"#),
            )
            .push(
                "gemini-1.5-flash",
                Ok(r#"{"production_impact": 0.05, "packaging_impact": 0.015, "transport_impact": 0.01}"#),
            );
        let report = pipeline(backend)
            .run(&FootprintInput::Text("lays chips 1oz".into()))
            .await
            .unwrap();

        let keys: Vec<&str> = report.stages.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "layer1_input_processing",
                "layer2_standardization",
                "layer3_knowledge_retrieval",
                "layer4_footprint_estimation",
                "layer5_final_summary"
            ]
        );
        let retrieval = report.get(Stage::KnowledgeRetrieval).unwrap();
        assert_eq!(retrieval["confidence"], "Medium");
        let estimate = report.get(Stage::FootprintEstimation).unwrap();
        assert_eq!(estimate["total_co2e_kg"], 0.075);
        assert!(report.summary().unwrap().contains("Lay's Classic Potato Chips"));
    }

    #[tokio::test]
    async fn offline_model_still_produces_a_report() {
        let backend = ScriptedBackend::failing(ModelError::NotConfigured("no key".into()));
        let report = pipeline(backend)
            .run(&FootprintInput::Text("anything".into()))
            .await
            .unwrap();
        let entity = report.get(Stage::Standardization).unwrap();
        assert_eq!(entity["category"], "Error");
        let retrieval = report.get(Stage::KnowledgeRetrieval).unwrap();
        assert_eq!(retrieval["co2e_kg"], 5.0);
        assert!(report.summary().is_some());
    }

    #[tokio::test]
    async fn missing_image_halts_at_first_stage() {
        let backend = ScriptedBackend::new();
        let failure = pipeline(backend)
            .run(&FootprintInput::Image("/no/such/file.png".into()))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::InputProcessing);
        assert_eq!(failure.label(), "Layer 1 (Input Processing) failed");
    }

    #[tokio::test]
    async fn unreadable_image_halts_before_standardization() {
        use std::io::Write;
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"not really a png").unwrap();

        let backend = Arc::new(ScriptedBackend::answering("I see a blurry shape"));
        let client = ModelClient::new(backend.clone(), vec!["gemini-1.5-flash".into()]);
        let pipeline = FootprintPipeline::new(client, "gemini-1.5-flash", Arc::new(NoOcr));
        let failure = pipeline
            .run(&FootprintInput::Image(file.path().to_path_buf()))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::InputProcessing);
        assert_eq!(backend.calls().len(), 1);
    }
}
