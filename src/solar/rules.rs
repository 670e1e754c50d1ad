//! Rule-based energy plan used whenever no model plan is available.
//!
//! The plan is a pure function of `(solar watts, battery %)`: four production bands
//! and three battery bands select fixed advice strings. Lower band edges are
//! exclusive, so exactly 2000 W is "Moderate Sun", 500 W is "Low Sun" and 100 W is
//! "Night/No Sun".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::clients::ResponseSimulator;
use crate::solar::{AllocationItem, EnergyPlan};

const CHARGE_MODE_WATTS: f64 = 1000.0;
const DEFAULT_PROMPT_WATTS: f64 = 0.0;
const DEFAULT_PROMPT_BATTERY: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarBand {
    Night,
    Low,
    Moderate,
    Peak,
}

impl SolarBand {
    pub fn classify(solar_watts: f64) -> Self {
        if solar_watts > 2000.0 {
            SolarBand::Peak
        } else if solar_watts > 500.0 {
            SolarBand::Moderate
        } else if solar_watts > 100.0 {
            SolarBand::Low
        } else {
            SolarBand::Night
        }
    }

    pub fn period(self) -> &'static str {
        match self {
            SolarBand::Peak => "Peak Sun (High Production)",
            SolarBand::Moderate => "Moderate Sun",
            SolarBand::Low => "Low Sun",
            SolarBand::Night => "Night/No Sun",
        }
    }

    /// Where heavy loads (water heater, washer) should draw from
    pub fn power_source_heavy(self) -> &'static str {
        match self {
            SolarBand::Peak | SolarBand::Moderate => "Direct Solar",
            SolarBand::Low | SolarBand::Night => "Battery",
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            SolarBand::Peak => {
                "Excellent time for high-power appliances. Run water heater and washing machine now."
            }
            SolarBand::Moderate => {
                "Good time for medium-power appliances. Save heavy tasks if possible."
            }
            SolarBand::Low => "Transition to battery power. Minimize non-essential usage.",
            SolarBand::Night => {
                "Use only essential appliances. Preserve battery for overnight needs."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryBand {
    Low,
    Moderate,
    High,
}

impl BatteryBand {
    pub fn classify(battery_percentage: f64) -> Self {
        if battery_percentage > 80.0 {
            BatteryBand::High
        } else if battery_percentage > 50.0 {
            BatteryBand::Moderate
        } else {
            BatteryBand::Low
        }
    }

    pub fn advice(self) -> &'static str {
        match self {
            BatteryBand::High => "Battery well charged. Can support high-power loads if needed.",
            BatteryBand::Moderate => {
                "Battery at moderate level. Monitor usage and prioritize essentials."
            }
            BatteryBand::Low => {
                "Battery getting low. Conserve power and avoid non-essential appliances."
            }
        }
    }
}

fn item(appliance: &str, time_to_run: &str, power_source: &str, priority: &str) -> AllocationItem {
    AllocationItem {
        appliance: appliance.to_string(),
        time_to_run: time_to_run.to_string(),
        power_source: power_source.to_string(),
        priority: priority.to_string(),
    }
}

/// Deterministic plan for the given conditions
pub fn rule_based_plan(solar_watts: f64, battery_percentage: f64) -> EnergyPlan {
    let band = SolarBand::classify(solar_watts);
    let battery = BatteryBand::classify(battery_percentage);
    let heavy = band.power_source_heavy();

    let lights_source = if solar_watts < 100.0 { "Battery" } else { "Solar" };
    let laptop_source = if solar_watts > 100.0 { "Solar" } else { "Battery" };
    let mode = if solar_watts > CHARGE_MODE_WATTS {
        "Charge mode active"
    } else {
        "Conservation mode - discharge minimally"
    };

    let mut alerts = vec![
        format!("Current solar production: {}W", solar_watts),
        format!("Battery level: {}%", battery_percentage),
    ];
    if solar_watts >= 0.0 {
        alerts.push("Demo mode active - simulated AI responses".to_string());
    }

    EnergyPlan {
        recommendation_summary: format!(
            "{} Current conditions: {}, Battery: {}%",
            band.recommendation(),
            band.period(),
            battery_percentage
        ),
        energy_allocation_plan: vec![
            item("Refrigerator", "24/7", "Solar/Battery", "Essential"),
            item("Lights (LED x5)", "As needed", lights_source, "Essential"),
            item("Water Heater", "During peak sun if available", heavy, "High"),
            item("Washing Machine", "When solar > 2000W", heavy, "Medium"),
            item("Television", "Evening (limited use)", "Battery", "Low"),
            item("Laptop Charger", "Daytime preferred", laptop_source, "Medium"),
        ],
        battery_management: format!(
            "{} Current solar: {}W. {}.",
            battery.advice(),
            solar_watts,
            mode
        ),
        alerts,
    }
}

static SOLAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Solar Panel Production: (-?[0-9]+(?:\.[0-9]+)?) Watts").expect("valid regex")
});
static BATTERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Current Battery Charge: (-?[0-9]+(?:\.[0-9]+)?)%").expect("valid regex")
});

/// Recover `(solar watts, battery %)` from an energy prompt; defaults 0 W / 50 %
pub fn conditions_from_prompt(prompt: &str) -> (f64, f64) {
    let capture = |re: &Regex| {
        re.captures(prompt)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };
    (
        capture(&SOLAR_RE).unwrap_or(DEFAULT_PROMPT_WATTS),
        capture(&BATTERY_RE).unwrap_or(DEFAULT_PROMPT_BATTERY),
    )
}

/// Simulates the model by reading the current state back out of the prompt text
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptStateSimulator;

impl ResponseSimulator for PromptStateSimulator {
    fn simulate(&self, prompt: &str) -> String {
        let (solar_watts, battery_percentage) = conditions_from_prompt(prompt);
        let plan = rule_based_plan(solar_watts, battery_percentage);
        serde_json::to_string(&plan).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges_are_exclusive_lower_bounds() {
        assert_eq!(SolarBand::classify(2000.0), SolarBand::Moderate);
        assert_eq!(SolarBand::classify(2000.1), SolarBand::Peak);
        assert_eq!(SolarBand::classify(500.0), SolarBand::Low);
        assert_eq!(SolarBand::classify(500.5), SolarBand::Moderate);
        assert_eq!(SolarBand::classify(100.0), SolarBand::Night);
        assert_eq!(SolarBand::classify(101.0), SolarBand::Low);
        assert_eq!(SolarBand::classify(0.0), SolarBand::Night);
    }

    #[test]
    fn battery_edges_are_exclusive_lower_bounds() {
        assert_eq!(BatteryBand::classify(80.0), BatteryBand::Moderate);
        assert_eq!(BatteryBand::classify(80.5), BatteryBand::High);
        assert_eq!(BatteryBand::classify(50.0), BatteryBand::Low);
        assert_eq!(BatteryBand::classify(51.0), BatteryBand::Moderate);
    }

    #[test]
    fn plan_is_deterministic() {
        for (solar, battery) in [(0.0, 0.0), (100.0, 50.0), (750.0, 81.0), (3500.0, 100.0)] {
            let a = rule_based_plan(solar, battery);
            let b = rule_based_plan(solar, battery);
            assert_eq!(a.recommendation_summary, b.recommendation_summary);
            assert_eq!(a.battery_management, b.battery_management);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn peak_sun_plan_runs_heavy_loads_on_direct_solar() {
        let band = SolarBand::classify(3500.0);
        assert_eq!(band.period(), "Peak Sun (High Production)");
        assert_eq!(band.power_source_heavy(), "Direct Solar");

        let plan = rule_based_plan(3500.0, 75.0);
        assert!(plan.recommendation_summary.contains("Peak Sun (High Production)"));
        assert!(plan.recommendation_summary.ends_with("Battery: 75%"));
        let heater = &plan.energy_allocation_plan[2];
        assert_eq!(heater.appliance, "Water Heater");
        assert_eq!(heater.power_source, "Direct Solar");
        assert!(plan.battery_management.contains("Charge mode active"));
        assert!(plan.battery_management.starts_with("Battery at moderate level."));
        assert_eq!(plan.alerts[0], "Current solar production: 3500W");
    }

    #[test]
    fn night_plan_draws_from_battery() {
        let plan = rule_based_plan(0.0, 30.0);
        assert!(plan.recommendation_summary.contains("Night/No Sun"));
        assert_eq!(plan.energy_allocation_plan[1].power_source, "Battery");
        assert_eq!(plan.energy_allocation_plan[5].power_source, "Battery");
        assert!(plan.battery_management.contains("Conservation mode"));
        assert!(plan.battery_management.starts_with("Battery getting low."));
    }

    #[test]
    fn conditions_are_read_back_from_prompt() {
        let prompt = "- Solar Panel Production: 1500.5 Watts\n- Current Battery Charge: 95% (9500.00 Wh)";
        assert_eq!(conditions_from_prompt(prompt), (1500.5, 95.0));
        assert_eq!(conditions_from_prompt("nothing here"), (0.0, 50.0));
    }

    #[test]
    fn simulator_output_parses_back_into_plan() {
        let text = PromptStateSimulator
            .simulate("Solar Panel Production: 3500 Watts\nCurrent Battery Charge: 75%");
        let plan: EnergyPlan = serde_json::from_str(&text).unwrap();
        assert_eq!(plan, rule_based_plan(3500.0, 75.0));
    }
}
