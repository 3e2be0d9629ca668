//! Daemon command: start the driver and serve the control socket

use std::path::Path;
use std::sync::Arc;

use pressled::ControlServer;
use pressled_core::{Driver, DriverConfig};
use pressled_line::SimChip;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    socket: Option<&Path>,
    simulate: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let driver_config = config.to_driver_config()?;
    let socket_path = socket
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.socket_path());

    let (driver, sim) = if simulate {
        let chip = SimChip::new(format!("sim-{}", config.chip));
        info!("Using simulated chip {}", config.chip);
        let driver = Driver::start(&chip, driver_config).await?;
        (driver, Some(chip))
    } else {
        (start_hardware(&config.chip, driver_config).await?, None)
    };
    let driver = Arc::new(driver);

    let listener = ControlServer::bind(&socket_path)?;
    info!("Listening on {}", socket_path.display());
    let server = ControlServer::new(Arc::clone(&driver), sim);
    let stop_server = server.shutdown_handle();
    let server_task = tokio::spawn(server.serve(listener));

    // Set up Ctrl-C handler
    let interrupted = Arc::new(Notify::new());
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.notify_one())?;
    }
    println!("Ready. Ctrl+C to stop.");

    interrupted.notified().await;
    info!("Interrupted, shutting down");

    stop_server.notify_one();
    if let Err(e) = server_task.await {
        warn!("Control server task failed: {}", e);
    }
    driver.shutdown().await;

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("Could not remove {}: {}", socket_path.display(), e);
    }
    Ok(())
}

#[cfg(feature = "cdev")]
async fn start_hardware(chip: &str, config: DriverConfig) -> anyhow::Result<Driver> {
    let chip = pressled_line::cdev::CdevChip::open(chip)?;
    Ok(Driver::start(&chip, config).await?)
}

#[cfg(not(feature = "cdev"))]
async fn start_hardware(chip: &str, _config: DriverConfig) -> anyhow::Result<Driver> {
    anyhow::bail!(
        "cannot open {chip}: built without GPIO support (enable the `cdev` feature) or use --simulate"
    )
}
