use anyhow::Result;
use hydro_dam_sensor::{config, controller, logging};
use config::Config;
use controller::Orchestrator;
use logging::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    info!(
        dam = %cfg.dam.dam_id,
        sensor = %cfg.dam.sensor_id,
        broker = %format!("{}:{} ({})", cfg.broker.host, cfg.broker.port, cfg.broker.mode),
        queue = %format!("{}:{} ({})", cfg.queue.host, cfg.queue.port, cfg.queue.mode),
        "loaded configuration"
    );

    let orchestrator = Orchestrator::from_config(&cfg);
    orchestrator.run(logging::shutdown_signal()).await?;

    info!("shutdown complete");
    Ok(())
}
