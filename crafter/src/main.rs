use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crafter::config::ConfigStore;
use crafter::driver::SimDriver;
use crafter::engine::{self, EngineOptions};
use crafter::events::EventBus;
use crafter::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = Arc::new(ConfigStore::on_disk()?);
    let bus = EventBus::default();

    // Scripted driver until a platform input/capture backend is wired in.
    let sim = Arc::new(SimDriver::default());
    tracing::warn!("running with the simulated input/capture driver; no real clicks will happen");

    let engine = engine::spawn(
        Arc::clone(&store),
        bus.clone(),
        sim.clone(),
        sim.clone(),
        EngineOptions::default(),
    );

    let addr = std::env::var("CRAFTER_ADDR").unwrap_or_else(|_| "127.0.0.1:8077".to_string());
    server::run(
        &addr,
        AppState {
            engine,
            bus,
            store,
            input: sim.clone(),
            reader: sim,
        },
    )
    .await
}
