mod domain;
mod infrastructure;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use domain::settings::SettingsService;
use infrastructure::bluetooth::connection::{BleTransport, ConnectionConfig};
use infrastructure::bluetooth::session::{MyoSession, SessionConfig};
use infrastructure::logging;

/// Connect to a Myo armband, configure it, and stream decoded IMU frames.
#[derive(Parser, Debug)]
#[command(name = "myo-stream", version, about)]
struct Cli {
    /// Bluetooth address of the armband, e.g. DF:36:19:6A:44:C8
    address: String,

    /// Put the armband into deep sleep when exiting
    #[arg(long)]
    sleep: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_service = SettingsService::new().context("failed to load settings")?;
    let settings = settings_service.get();
    let _log_guard = logging::init_logger(&settings.log_settings)?;

    info!("Starting Myo stream for {}", cli.address);

    let connection_config = ConnectionConfig {
        scan_timeout_secs: settings.scan_timeout_secs,
        control_service_uuid: settings.ble_control_service_uuid.clone(),
        command_char_uuid: settings.ble_command_char_uuid.clone(),
        imu_data_char_uuid: settings.ble_imu_data_char_uuid.clone(),
        battery_char_uuid: settings.ble_battery_char_uuid.clone(),
    };
    let session_config = SessionConfig {
        ready_poll_interval: Duration::from_millis(settings.ready_poll_interval_ms),
        ready_max_polls: settings.ready_max_polls,
    };

    let transport = BleTransport::open(&cli.address, connection_config)
        .await
        .with_context(|| format!("no usable device at {}", cli.address))?;
    let mut session = MyoSession::new(Arc::new(transport), session_config);

    session
        .connect(true)
        .await
        .context("could not connect to the armband")?;

    // Configure: locked, awake, streaming IMU only. Command failures are
    // logged by the session and do not end the run.
    let _ = session.lock().await;
    let _ = session.set_never_sleep().await;

    let _ = session.subscribe_to_imu().await;
    session
        .attach_imu_handler(|device, frame| {
            println!(
                "[{device}] quat: {:?} acc: {:?} gyro: {:?}",
                frame.quaternion, frame.acceleration, frame.gyroscope
            );
        })
        .await
        .context("could not attach the IMU handler")?;
    let _ = session.enable_imu().await;

    let battery = session
        .battery_level()
        .await
        .context("battery level read failed")?;
    println!("Battery: {battery}%");

    info!("Streaming from {}. Press Ctrl+C to exit...", session.device_id());
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl+C")?;

    info!("Shutting down...");
    session.shutdown(cli.sleep).await;
    if let Err(e) = session.disconnect().await {
        warn!(error = %e, "disconnect reported an error");
    }

    Ok(())
}
