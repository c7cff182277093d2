use crate::application::tachometer::{FanSpec, TachometerConfig};
use crate::domain::sample::GasChannel;
use anyhow::{bail, ensure};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct LoggerConfig {
    #[serde(default)]
    pub sampling: SamplingSettings,
    #[serde(default)]
    pub gnss: GnssSettings,
    #[serde(default = "default_fans")]
    pub fans: Vec<FanSettings>,
    #[serde(default)]
    pub gas_sensors: GasSensorSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingSettings {
    pub sample_interval_ms: u64,
    pub flush_interval_secs: u64,
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            flush_interval_secs: 60,
            output_dir: PathBuf::from("data"),
            file_prefix: "MAQM_data".to_string(),
        }
    }
}

impl SamplingSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GnssSettings {
    /// Serial device carrying the receiver's NMEA output, or a recorded log
    pub source: Option<PathBuf>,
    /// Only used when `source` is a serial device
    pub baud_rate: u32,
}

impl Default for GnssSettings {
    fn default() -> Self {
        Self {
            source: None,
            baud_rate: default_baud_rate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FanSettings {
    pub name: String,
    pub tach_line: u32,
    #[serde(default = "default_pulses_per_revolution")]
    pub pulses_per_revolution: u32,
    #[serde(default = "default_min_rated_rpm")]
    pub min_rated_rpm: f64,
    pub stall_timeout_ms: Option<u64>,
}

impl FanSettings {
    pub fn spec(&self) -> FanSpec {
        let mut config =
            TachometerConfig::for_min_rpm(self.pulses_per_revolution, self.min_rated_rpm);
        if let Some(ms) = self.stall_timeout_ms {
            config.stall_timeout = Duration::from_millis(ms);
        }
        FanSpec {
            name: self.name.clone(),
            line: self.tach_line,
            config,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GasSensorSettings {
    pub co: Option<PathBuf>,
    pub no2: Option<PathBuf>,
    pub o3: Option<PathBuf>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for GasSensorSettings {
    fn default() -> Self {
        Self {
            co: None,
            no2: None,
            o3: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: 2000,
        }
    }
}

impl GasSensorSettings {
    pub fn port(&self, channel: GasChannel) -> Option<&Path> {
        match channel {
            GasChannel::Co => self.co.as_deref(),
            GasChannel::No2 => self.no2.as_deref(),
            GasChannel::O3 => self.o3.as_deref(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn default_fans() -> Vec<FanSettings> {
    [("fan1", 6), ("fan2", 26)]
        .into_iter()
        .map(|(name, tach_line)| FanSettings {
            name: name.to_string(),
            tach_line,
            pulses_per_revolution: default_pulses_per_revolution(),
            min_rated_rpm: default_min_rated_rpm(),
            stall_timeout_ms: None,
        })
        .collect()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_pulses_per_revolution() -> u32 {
    2
}

fn default_min_rated_rpm() -> f64 {
    300.0
}

impl LoggerConfig {
    /// Reject settings that would make the sampling loop or the CSV layout meaningless
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.sampling.sample_interval_ms > 0,
            "sampling.sample_interval_ms must be positive"
        );
        ensure!(
            !self.sampling.file_prefix.trim().is_empty(),
            "sampling.file_prefix must not be empty"
        );

        let mut names = HashSet::new();
        for fan in &self.fans {
            ensure!(!fan.name.trim().is_empty(), "fan names must not be empty");
            ensure!(
                fan.pulses_per_revolution > 0,
                "fan {}: pulses_per_revolution must be positive",
                fan.name
            );
            ensure!(
                fan.min_rated_rpm >= 1.0 && fan.min_rated_rpm.is_finite(),
                "fan {}: min_rated_rpm must be at least 1",
                fan.name
            );
            if !names.insert(fan.name.as_str()) {
                bail!("duplicate fan name {}", fan.name);
            }
        }

        ensure!(self.gnss.baud_rate > 0, "gnss.baud_rate must be positive");
        ensure!(
            self.gas_sensors.baud_rate > 0,
            "gas_sensors.baud_rate must be positive"
        );
        Ok(())
    }
}

/// Load `config/maqm.*` (optional) overlaid with `MAQM_*` environment variables,
/// e.g. `MAQM_SAMPLING__FLUSH_INTERVAL_SECS=30`
pub fn load_logger_config() -> anyhow::Result<LoggerConfig> {
    load_logger_config_from("config/maqm")
}

pub fn load_logger_config_from(name: &str) -> anyhow::Result<LoggerConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(name).required(false))
        .add_source(
            config::Environment::with_prefix("MAQM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
