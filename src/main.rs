// Main entry point - Dependency injection and sampling loop setup
mod application;
mod domain;
mod infrastructure;

use std::sync::Arc;

use anyhow::Context;
use chrono::Local;

use crate::application::fix_aggregator::FixStateAggregator;
use crate::application::logging_service::LoggingService;
use crate::application::sample_assembler::{SampleAssembler, fan_channels};
use crate::application::tachometer::{FanSpec, SharedEdgeSource};
use crate::domain::sample::GasChannel;
use crate::infrastructure::config::load_logger_config;
use crate::infrastructure::csv_sink::BufferedCsvSink;
use crate::infrastructure::nmea_reader::spawn_nmea_reader;
use crate::infrastructure::serial_gas_sensor::SerialLineGasSensor;

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,maqm_logger=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[cfg(feature = "gpio")]
fn platform_edge_source() -> Option<SharedEdgeSource> {
    use crate::infrastructure::gpio_edge_source::RppalEdgeSource;

    match RppalEdgeSource::new() {
        Ok(source) => Some(Arc::new(std::sync::Mutex::new(source))),
        Err(err) => {
            tracing::warn!(error = %err, "GPIO unavailable");
            None
        }
    }
}

/// Built without the `gpio` feature; fan columns stay empty.
#[cfg(not(feature = "gpio"))]
fn platform_edge_source() -> Option<SharedEdgeSource> {
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    // Load configuration
    let config = load_logger_config()?;
    config.validate()?;

    // GNSS: decoder task -> aggregator
    let aggregator = Arc::new(FixStateAggregator::new());
    let gnss_task = match &config.gnss.source {
        Some(source) => Some(spawn_nmea_reader(
            source.clone(),
            config.gnss.baud_rate,
            aggregator.clone(),
        )),
        None => {
            tracing::warn!("no GNSS source configured; GNSS columns stay empty");
            None
        }
    };

    // Assembler with every collaborator resolved once
    let fan_specs: Vec<FanSpec> = config.fans.iter().map(|fan| fan.spec()).collect();
    let mut assembler = SampleAssembler::new(aggregator)
        .with_fans(fan_channels(&fan_specs, platform_edge_source()));
    for channel in GasChannel::ALL {
        if let Some(port) = config.gas_sensors.port(channel) {
            let sensor = SerialLineGasSensor::new(
                port,
                config.gas_sensors.baud_rate,
                config.gas_sensors.read_timeout(),
            );
            assembler = assembler.with_gas_sensor(channel, Arc::new(sensor));
        }
    }

    // Session CSV
    let sampling = &config.sampling;
    std::fs::create_dir_all(&sampling.output_dir).with_context(|| {
        format!("failed to create output directory {}", sampling.output_dir.display())
    })?;
    let path =
        BufferedCsvSink::session_path(&sampling.output_dir, &sampling.file_prefix, Local::now());
    let sink = BufferedCsvSink::new(path, &assembler.layout(), sampling.flush_interval());
    tracing::info!(path = %sink.path().display(), "logging to CSV");

    let service = LoggingService::new(assembler, sink, sampling.sample_interval());
    let result = service.run(shutdown_signal()).await;

    if let Some(task) = gnss_task {
        task.abort();
    }
    result?;

    Ok(())
}
