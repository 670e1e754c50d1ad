use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::clients::{ModelClient, RawModelOutput};
use crate::parsing::parse_model_json;
use crate::solar::rules::{PromptStateSimulator, rule_based_plan};
use crate::solar::{ApplianceTable, EnergyLogEntry, EnergyPlan, SolarSettings};

const LOG_CONTEXT_ENTRIES: usize = 3;

/// Where a returned plan came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanSource {
    Model { model: String },
    Simulated,
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyAdvice {
    pub plan: EnergyPlan,
    pub source: PlanSource,
}

/// Tracks solar production and battery state and asks the model for a management plan
#[derive(Debug, Clone)]
pub struct SolarEnergyAgent {
    client: ModelClient,
    battery_capacity_wh: f64,
    appliances: ApplianceTable,
    energy_log: Vec<EnergyLogEntry>,
}

impl SolarEnergyAgent {
    /// The client gets the prompt-state simulator attached, so a plan is always produced
    pub fn new(client: ModelClient, settings: SolarSettings) -> Self {
        Self {
            client: client.with_simulator(Arc::new(PromptStateSimulator)),
            battery_capacity_wh: settings.battery_capacity_wh,
            appliances: settings.appliances,
            energy_log: Vec::new(),
        }
    }

    pub fn settings(&self) -> SolarSettings {
        SolarSettings {
            battery_capacity_wh: self.battery_capacity_wh,
            appliances: self.appliances.clone(),
        }
    }

    pub fn energy_log(&self) -> &[EnergyLogEntry] {
        &self.energy_log
    }

    pub fn build_prompt(
        &self,
        solar_production_watts: f64,
        battery_percentage: f64,
        now: DateTime<Local>,
    ) -> String {
        let battery_wh = self.battery_capacity_wh * (battery_percentage / 100.0);
        let appliances = serde_json::to_string_pretty(&self.appliances).unwrap_or_default();
        let start = self.energy_log.len().saturating_sub(LOG_CONTEXT_ENTRIES);
        let recent_log = serde_json::to_string_pretty(&self.energy_log[start..]).unwrap_or_default();

        format!(
            r#"Act as an expert AI Solar Energy Management Agent.

Current State at {time}:
- Solar Panel Production: {solar} Watts
- Battery Capacity: {capacity} Wh
- Current Battery Charge: {battery}% ({battery_wh:.2} Wh)

List of available electrical appliances and their power draw:
{appliances}

Previous Energy Log (last {n} entries):
{recent_log}

Task:
Provide a detailed energy management plan in a structured JSON format.

IMPORTANT: Respond ONLY with valid JSON, no other text or explanations.

The JSON should include:
1.  `recommendation_summary`: A brief, actionable summary.
2.  `energy_allocation_plan`: A list of objects, each with `appliance`, `time_to_run`, `power_source` (Direct Solar or Battery), and `priority` (Essential, High, Medium, Low).
3.  `battery_management`: Specific instructions on when to charge or discharge the battery.
4.  `alerts`: Any important alerts for the user (e.g., "Low production forecast", "Excess energy available").

Prioritize running high-power appliances directly from solar during peak production.
Use the battery for essential loads when solar production is low or at night.
Ensure the battery is preserved for essential needs."#,
            time = now.format("%Y-%m-%d %H:%M:%S"),
            solar = solar_production_watts,
            capacity = self.battery_capacity_wh,
            battery = battery_percentage,
            battery_wh = battery_wh,
            appliances = appliances,
            n = LOG_CONTEXT_ENTRIES,
            recent_log = recent_log,
        )
    }

    /// Append the reading to the log and build the prompt that already includes it.
    /// The returned request owns a client handle, so the model call can run
    /// after the agent is released.
    pub fn record_reading(
        &mut self,
        solar_production_watts: f64,
        battery_percentage: f64,
    ) -> PendingAdvice {
        let now = Local::now();
        self.energy_log.push(EnergyLogEntry {
            timestamp: now,
            solar_production_watts,
            battery_percentage,
        });
        PendingAdvice {
            client: self.client.clone(),
            prompt: self.build_prompt(solar_production_watts, battery_percentage, now),
            solar_production_watts,
            battery_percentage,
        }
    }

    /// Log the reading, then return the model's plan or a rule-based one
    pub async fn track_and_advise(
        &mut self,
        solar_production_watts: f64,
        battery_percentage: f64,
    ) -> EnergyAdvice {
        self.record_reading(solar_production_watts, battery_percentage)
            .resolve()
            .await
    }
}

/// A logged reading whose plan has not been requested yet
pub struct PendingAdvice {
    client: ModelClient,
    prompt: String,
    solar_production_watts: f64,
    battery_percentage: f64,
}

impl PendingAdvice {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub async fn resolve(self) -> EnergyAdvice {
        let output = self.client.generate_content(&self.prompt).await;
        let source = match &output {
            RawModelOutput::Generated(reply) => PlanSource::Model {
                model: reply.model.clone(),
            },
            _ => PlanSource::Simulated,
        };

        if let Some(text) = output.text() {
            match parse_model_json::<EnergyPlan>(text) {
                Ok(plan) => {
                    info!(
                        "Energy plan ready ({:?}) for {}W / {}%",
                        source, self.solar_production_watts, self.battery_percentage
                    );
                    return EnergyAdvice { plan, source };
                }
                Err(e) => warn!("Falling back to rule-based plan: {}", e),
            }
        }

        EnergyAdvice {
            plan: rule_based_plan(self.solar_production_watts, self.battery_percentage),
            source: PlanSource::RuleBased,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ModelError;
    use crate::clients::fallback::testing::ScriptedBackend;

    fn agent_with(backend: ScriptedBackend) -> SolarEnergyAgent {
        let client = ModelClient::new(
            Arc::new(backend),
            vec!["gemini-1.5-flash".into(), "gemini-1.5-pro".into()],
        );
        SolarEnergyAgent::new(client, SolarSettings::default())
    }

    #[tokio::test]
    async fn model_plan_is_used_when_parsable() {
        let reply = r#"Here you go:
```json
{"recommendation_summary": "Run everything", "energy_allocation_plan": [], "battery_management": "Charge", "alerts": []}
```"#;
        let mut agent = agent_with(ScriptedBackend::answering(reply));
        let advice = agent.track_and_advise(2500.0, 60.0).await;
        assert_eq!(advice.plan.recommendation_summary, "Run everything");
        assert_eq!(
            advice.source,
            PlanSource::Model {
                model: "gemini-1.5-flash".into()
            }
        );
    }

    #[tokio::test]
    async fn unparsable_model_text_falls_back_to_rules() {
        let mut agent = agent_with(ScriptedBackend::answering("I cannot help with that."));
        let advice = agent.track_and_advise(3500.0, 75.0).await;
        assert_eq!(advice.source, PlanSource::RuleBased);
        assert_eq!(advice.plan, rule_based_plan(3500.0, 75.0));
    }

    #[tokio::test]
    async fn unreachable_model_uses_simulated_plan_for_actual_inputs() {
        let mut agent = agent_with(ScriptedBackend::failing(ModelError::RateLimited {
            model: "gemini-1.5-flash".into(),
        }));
        let advice = agent.track_and_advise(3500.0, 75.0).await;
        assert_eq!(advice.source, PlanSource::Simulated);
        assert_eq!(advice.plan, rule_based_plan(3500.0, 75.0));
    }

    #[tokio::test]
    async fn log_grows_once_per_call_and_prompt_shows_last_three() {
        let mut agent = agent_with(ScriptedBackend::failing(ModelError::Transport("down".into())));
        for (solar, battery) in [(10.0, 11.0), (20.0, 21.0), (30.0, 31.0), (40.0, 41.0)] {
            agent.track_and_advise(solar, battery).await;
        }
        assert_eq!(agent.energy_log().len(), 4);

        let prompt = agent.build_prompt(50.0, 51.0, Local::now());
        assert!(!prompt.contains("\"solar_production_watts\": 10.0"));
        assert!(prompt.contains("\"solar_production_watts\": 20.0"));
        assert!(prompt.contains("\"solar_production_watts\": 40.0"));
        assert!(prompt.contains("Solar Panel Production: 50 Watts"));
        assert!(prompt.contains("Current Battery Charge: 51% (5100.00 Wh)"));
        assert!(prompt.contains("\"Water Heater\": 3000.0"));
    }

    #[tokio::test]
    async fn first_prompt_already_lists_the_current_reading() {
        let backend = Arc::new(ScriptedBackend::failing(ModelError::Transport("down".into())));
        let client = ModelClient::new(backend.clone(), vec!["gemini-1.5-flash".into()]);
        let mut agent = SolarEnergyAgent::new(client, SolarSettings::default());

        agent.track_and_advise(1234.0, 56.0).await;

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        let log_section = prompts[0]
            .split("(last 3 entries):")
            .nth(1)
            .unwrap();
        assert!(log_section.contains("\"solar_production_watts\": 1234.0"));
        assert!(log_section.contains("\"battery_percentage\": 56.0"));
    }

    #[test]
    fn recording_a_reading_does_not_call_the_model() {
        let backend = Arc::new(ScriptedBackend::new());
        let client = ModelClient::new(backend.clone(), vec!["gemini-1.5-flash".into()]);
        let mut agent = SolarEnergyAgent::new(client, SolarSettings::default());

        let pending = agent.record_reading(800.0, 40.0);
        assert_eq!(agent.energy_log().len(), 1);
        assert!(pending.prompt().contains("Solar Panel Production: 800 Watts"));
        assert!(backend.calls().is_empty());
    }
}
