use log::{error, info, warn};
use std::sync::Arc;
use tokio::time::sleep;

use ble_sensor_beacon::bluetooth::{
    BluezRadio, BroadcastSession, Capability, StaticPermissions,
};
use ble_sensor_beacon::config::BeaconConfig;
use ble_sensor_beacon::sensor::{IioSensors, NoSensors, SensorChannels, SensorSource, SourceOptions};
use ble_sensor_beacon::utils::format_millis;
use ble_sensor_beacon::BeaconError;

/// Hand one advertisement to the radio and wait for its outcome
async fn broadcast(
    session: &BroadcastSession,
    temperature: i16,
    humidity: i16,
) -> Result<(), BeaconError> {
    session.start(temperature, humidity).await?;
    let settings = session.wait_outcome().await?;
    info!(
        "Broadcasting temperature={} humidity={} ({:?} mode)",
        temperature, humidity, settings.mode
    );
    Ok(())
}

async fn main_loop(
    config: &BeaconConfig,
    source: &SensorSource,
    session: &BroadcastSession,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some((temperature, humidity)) = config.fixed_values {
        // Simplest mode: one advertisement that runs until shutdown
        broadcast(session, temperature, humidity).await?;
        std::future::pending::<()>().await;
    }

    info!("Starting sensor beacon broadcast loop");
    loop {
        let reading = source.current_reading();
        let (temperature, humidity) = reading.to_raw_units();
        info!(
            "Reading from {}: {:.2}°C, {:.2}% ({:?})",
            format_millis(reading.captured_at),
            reading.temperature,
            reading.humidity,
            source.state()
        );

        if let Err(e) = broadcast(session, temperature, humidity).await {
            error!("Broadcast failed: {}", e);
            if matches!(
                e,
                BeaconError::PermissionDenied(_) | BeaconError::UnsupportedHardware(_)
            ) {
                return Err(e.into());
            }
        }

        sleep(config.broadcast_interval).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BeaconConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let channels: Arc<dyn SensorChannels> = if config.granted.contains(&Capability::Sensors) {
        Arc::new(IioSensors::probe(&config.iio_path))
    } else {
        warn!("Sensor access not granted - using mock data");
        Arc::new(NoSensors)
    };
    let source = SensorSource::new(
        channels,
        SourceOptions {
            tick_interval: config.tick_interval,
            ..Default::default()
        },
    );

    let radio = match BluezRadio::new().await {
        Ok(radio) => radio,
        Err(e) => {
            error!("Failed to initialize radio: {}", e);
            return Err(e);
        }
    };
    let permissions = StaticPermissions::new(config.granted.iter().copied());
    let session = BroadcastSession::new(
        Arc::new(radio),
        Arc::new(permissions),
        config.session_options(),
    );

    source.start();

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(&config, &source, &session) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    session.stop();
    source.cleanup();
    // Give the radio worker a moment to unregister the advertisement
    sleep(std::time::Duration::from_millis(200)).await;

    Ok(())
}
