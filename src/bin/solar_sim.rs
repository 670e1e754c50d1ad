//! Four-point solar simulation against the configured model.
//!
//! Usage:
//!   cargo run --bin solar-sim
//!   cargo run --bin solar-sim -- --pause-ms 0 --point 2500:60

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use eco_agents::clients::{GeminiBackend, ModelClient};
use eco_agents::config::Config;
use eco_agents::solar::{EnergyAdvice, SolarEnergyAgent};

const DEFAULT_POINTS: [(f64, f64); 4] =
    [(3500.0, 75.0), (1500.0, 95.0), (100.0, 85.0), (0.0, 70.0)];

#[derive(Parser)]
#[command(name = "solar-sim")]
#[command(about = "Run the solar energy agent over a sequence of readings", long_about = None)]
struct Cli {
    /// Pause between steps in milliseconds
    #[arg(long, default_value_t = 3000)]
    pause_ms: u64,
    /// Reading as SOLAR_WATTS:BATTERY_PCT; repeat for several (default: peak, afternoon, evening, night)
    #[arg(long = "point", value_parser = parse_point)]
    points: Vec<(f64, f64)>,
}

fn parse_point(raw: &str) -> std::result::Result<(f64, f64), String> {
    let (solar, battery) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected SOLAR:BATTERY, got '{}'", raw))?;
    let solar = solar
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad solar watts '{}': {}", solar, e))?;
    let battery = battery
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad battery percentage '{}': {}", battery, e))?;
    Ok((solar, battery))
}

fn print_advice(advice: &EnergyAdvice) {
    let plan = &advice.plan;
    println!("\n[Recommendation Summary] ({:?}):", advice.source);
    println!("{}", plan.recommendation_summary);
    println!("\n[Energy Allocation Plan]:");
    for item in &plan.energy_allocation_plan {
        println!(
            "  - {} ({}): Run {} from {}",
            item.appliance, item.priority, item.time_to_run, item.power_source
        );
    }
    println!("\n[Battery Management]:");
    println!("{}", plan.battery_management);
    println!("\n[Alerts]:");
    for alert in &plan.alerts {
        println!("  - {}", alert);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    eco_agents::init_tracing();
    let cli = Cli::parse();
    let config = Config::load()?;

    let backend = GeminiBackend::from_config(&config.model)?;
    let client = ModelClient::new(Arc::new(backend), config.model.candidates.clone());
    let mut agent = SolarEnergyAgent::new(client, config.solar.clone());

    let points = if cli.points.is_empty() {
        DEFAULT_POINTS.to_vec()
    } else {
        cli.points
    };

    println!("--- Solar Energy Agent Simulation Starting ---");
    for (idx, (solar, battery)) in points.iter().enumerate() {
        println!("\n--- Simulation Step {} ---", idx + 1);
        println!("Input: Solar Production = {}W, Battery = {}%", solar, battery);

        let advice = agent.track_and_advise(*solar, *battery).await;
        print_advice(&advice);

        if idx + 1 < points.len() && cli.pause_ms > 0 {
            println!("\nWaiting for next update...");
            tokio::time::sleep(Duration::from_millis(cli.pause_ms)).await;
        }
    }
    println!("\n--- Simulation Complete ---");
    Ok(())
}
