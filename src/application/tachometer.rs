// Tachometer estimator - Rising-edge timestamps to smoothed RPM
use crate::domain::fan::{EdgeObservation, RpmReading};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// Weight given to the newest instantaneous RPM
const SMOOTHING_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TachometerConfig {
    pub pulses_per_revolution: u32,
    /// No edge for longer than this reads as a stopped fan
    pub stall_timeout: Duration,
}

impl TachometerConfig {
    /// Stall timeout of twice the pulse period at the slowest rated speed
    pub fn for_min_rpm(pulses_per_revolution: u32, min_rated_rpm: f64) -> Self {
        let pulses_per_second = min_rated_rpm * pulses_per_revolution as f64 / 60.0;
        Self {
            pulses_per_revolution,
            stall_timeout: Duration::from_secs_f64(2.0 / pulses_per_second),
        }
    }
}

impl Default for TachometerConfig {
    fn default() -> Self {
        Self::for_min_rpm(2, 300.0)
    }
}

/// Producer half handed to the platform edge callback
#[derive(Debug, Clone)]
pub struct EdgeSender {
    tx: watch::Sender<Option<EdgeObservation>>,
}

impl EdgeSender {
    /// Record one rising edge. Edges at or before the latest one are dropped.
    pub fn on_edge(&self, timestamp: Instant) {
        self.tx.send_if_modified(|slot| {
            let next = match *slot {
                None => EdgeObservation {
                    last_edge: timestamp,
                    interval: None,
                },
                Some(prev) => match timestamp.checked_duration_since(prev.last_edge) {
                    Some(interval) if !interval.is_zero() => EdgeObservation {
                        last_edge: timestamp,
                        interval: Some(interval),
                    },
                    _ => return false,
                },
            };
            *slot = Some(next);
            true
        });
    }
}

#[derive(Debug)]
pub struct TachometerEstimator {
    config: TachometerConfig,
    edges: watch::Receiver<Option<EdgeObservation>>,
    smoothed: Option<f64>,
    has_data: bool,
}

impl TachometerEstimator {
    pub fn new(config: TachometerConfig) -> (Self, EdgeSender) {
        let (tx, rx) = watch::channel(None);
        let estimator = Self {
            config,
            edges: rx,
            smoothed: None,
            has_data: false,
        };
        (estimator, EdgeSender { tx })
    }

    /// True once any edge has ever been observed
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn update_rpm(&mut self) -> RpmReading {
        self.update_rpm_at(Instant::now())
    }

    pub fn update_rpm_at(&mut self, now: Instant) -> RpmReading {
        if self.edges.has_changed().is_err() {
            tracing::debug!("tachometer edge source closed");
            return RpmReading::Unknown;
        }

        let Some(observation) = *self.edges.borrow_and_update() else {
            return RpmReading::Unknown;
        };
        self.has_data = true;

        if now.saturating_duration_since(observation.last_edge) > self.config.stall_timeout {
            self.smoothed = None;
            return RpmReading::Rpm(0.0);
        }

        // A single edge, or the first edge after a stall, is not a full
        // pulse interval yet
        let Some(interval) = observation
            .interval
            .filter(|interval| *interval <= self.config.stall_timeout)
        else {
            return RpmReading::Unknown;
        };

        let instantaneous =
            60.0 / (interval.as_secs_f64() * self.config.pulses_per_revolution as f64);
        let smoothed = match self.smoothed {
            Some(prev) => (1.0 - SMOOTHING_ALPHA) * prev + SMOOTHING_ALPHA * instantaneous,
            None => instantaneous,
        };
        self.smoothed = Some(smoothed);
        RpmReading::Rpm(smoothed)
    }
}

#[derive(Debug, Error)]
pub enum EdgeSourceError {
    #[error("edge line {line} unavailable: {reason}")]
    LineUnavailable { line: u32, reason: String },
}

/// Platform edge-detection collaborator (GPIO interrupts or a sampling thread)
pub trait EdgeSource: Send {
    /// Start delivering rising edges on `line` to `edges`
    fn watch(&mut self, line: u32, edges: EdgeSender) -> Result<(), EdgeSourceError>;

    fn release(&mut self, line: u32);
}

pub type SharedEdgeSource = Arc<Mutex<dyn EdgeSource>>;

/// Which edge line feeds which fan column
#[derive(Debug, Clone, PartialEq)]
pub struct FanSpec {
    pub name: String,
    pub line: u32,
    pub config: TachometerConfig,
}

/// One monitored fan. Releases its edge line when dropped.
pub struct FanMonitor {
    name: String,
    line: u32,
    estimator: TachometerEstimator,
    source: SharedEdgeSource,
}

impl FanMonitor {
    pub fn start(
        name: impl Into<String>,
        line: u32,
        config: TachometerConfig,
        source: SharedEdgeSource,
    ) -> Result<Self, EdgeSourceError> {
        let (estimator, sender) = TachometerEstimator::new(config);
        source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watch(line, sender)?;

        let name = name.into();
        tracing::info!(fan = %name, line, "tachometer monitoring started");
        Ok(Self {
            name,
            line,
            estimator,
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_rpm(&mut self) -> RpmReading {
        self.estimator.update_rpm()
    }
}

impl Drop for FanMonitor {
    fn drop(&mut self) {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(self.line);
        tracing::debug!(fan = %self.name, line = self.line, "tachometer line released");
    }
}
