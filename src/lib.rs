pub mod clients;
pub mod config;
pub mod deserializers;
pub mod error;
pub mod footprint;
pub mod http;
pub mod parsing;
pub mod solar;
pub mod utils;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` wins over the default `eco_agents=info`
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eco_agents=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
