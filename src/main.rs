use anyhow::Result;
use eco_agents::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    eco_agents::init_tracing();
    let config = Config::load()?;

    info!(
        "Starting Eco Agents API (models: {})",
        config.model.candidates.join(", ")
    );
    eco_agents::http::start_http_server(config).await
}
