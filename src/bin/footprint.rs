//! Run the carbon footprint pipeline from the command line.
//!
//! Usage:
//!   cargo run --bin footprint -- A_bag_of_chpis.png
//!   cargo run --bin footprint -- "Lay's Classic Potato Chips (1 oz)" --out results.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use eco_agents::clients::{GeminiBackend, ModelClient, TesseractCli};
use eco_agents::config::Config;
use eco_agents::footprint::{FootprintInput, FootprintPipeline};

#[derive(Parser)]
#[command(name = "footprint")]
#[command(about = "Estimate the carbon footprint of an image or a product description", long_about = None)]
struct Cli {
    /// Path to an image, or literal product text
    input: String,
    /// Where to write the stage results
    #[arg(long, default_value = "pipeline_results.json")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    eco_agents::init_tracing();
    let cli = Cli::parse();
    let config = Config::load()?;

    let backend = GeminiBackend::from_config(&config.model)?;
    let client = ModelClient::new(Arc::new(backend), config.model.candidates.clone());
    let pipeline = FootprintPipeline::new(
        client,
        &config.model.vision_model,
        Arc::new(TesseractCli::from_config(&config.ocr)),
    );

    let input = FootprintInput::from_arg(&cli.input);
    let report = pipeline.run(&input).await?;

    std::fs::write(&cli.out, serde_json::to_string_pretty(&report)?)?;
    if let Some(summary) = report.summary() {
        println!("{}", summary);
    }
    println!("\nComplete results saved to '{}'", cli.out.display());
    Ok(())
}
