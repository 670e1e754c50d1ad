//! Solar energy management: types shared by the agent, the rule-based planner and the HTTP layer.

pub mod agent;
pub mod rules;

use std::fmt;

use chrono::{DateTime, Local};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use agent::{EnergyAdvice, PlanSource, SolarEnergyAgent};
pub use rules::{BatteryBand, PromptStateSimulator, SolarBand, rule_based_plan};

pub const DEFAULT_BATTERY_CAPACITY_WH: f64 = 10_000.0;

/// One appliance and its power draw in watts
#[derive(Debug, Clone, PartialEq)]
pub struct Appliance {
    pub name: String,
    pub watts: f64,
}

/// Appliance table keyed by name, in insertion order.
///
/// Serialized as a JSON/TOML map (`{"Refrigerator": 200, ...}`) so it matches what
/// front-ends send; deserialization keeps document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceTable(Vec<Appliance>);

impl ApplianceTable {
    pub fn iter(&self) -> impl Iterator<Item = &Appliance> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn watts(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|a| a.name == name).map(|a| a.watts)
    }
}

impl Default for ApplianceTable {
    fn default() -> Self {
        let fixed = [
            ("Refrigerator", 200.0),
            ("Lights (LED x5)", 50.0),
            ("Television", 150.0),
            ("Washing Machine", 2000.0),
            ("Water Heater", 3000.0),
            ("Laptop Charger", 65.0),
        ];
        Self(
            fixed
                .into_iter()
                .map(|(name, watts)| Appliance {
                    name: name.to_string(),
                    watts,
                })
                .collect(),
        )
    }
}

impl Serialize for ApplianceTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for appliance in &self.0 {
            map.serialize_entry(&appliance.name, &appliance.watts)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ApplianceTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ApplianceTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of appliance name to power draw in watts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                use serde::de::Error;
                let mut appliances = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, raw)) = access.next_entry::<String, serde_json::Value>()? {
                    let watts = crate::deserializers::f64_from_value(&raw).ok_or_else(|| {
                        A::Error::custom(format!("invalid power draw for '{}': {}", name, raw))
                    })?;
                    appliances.push(Appliance { name, watts });
                }
                Ok(ApplianceTable(appliances))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Battery size plus appliance table; the mutable "current configuration" of the energy service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarSettings {
    pub battery_capacity_wh: f64,
    pub appliances: ApplianceTable,
}

impl Default for SolarSettings {
    fn default() -> Self {
        Self {
            battery_capacity_wh: DEFAULT_BATTERY_CAPACITY_WH,
            appliances: ApplianceTable::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationItem {
    #[serde(default)]
    pub appliance: String,
    #[serde(default)]
    pub time_to_run: String,
    #[serde(default)]
    pub power_source: String,
    #[serde(default)]
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPlan {
    pub recommendation_summary: String,
    #[serde(default)]
    pub energy_allocation_plan: Vec<AllocationItem>,
    #[serde(default)]
    pub battery_management: String,
    #[serde(default)]
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyLogEntry {
    pub timestamp: DateTime<Local>,
    pub solar_production_watts: f64,
    pub battery_percentage: f64,
}
