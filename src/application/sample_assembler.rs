// Sample assembler - Pulls every collaborator once per tick into one flat row
use crate::application::fix_aggregator::FixStateAggregator;
use crate::application::sensor_sources::{GasSensor, ParticulateSensor};
use crate::application::tachometer::{FanMonitor, FanSpec, SharedEdgeSource};
use crate::domain::sample::{ColumnLayout, GasChannel, GasReading, SampleRow, Sen66Reading};
use chrono::{DateTime, Local};
use futures::future::join_all;
use std::sync::Arc;

/// A fan column. Capability is decided once at startup.
pub enum FanChannel {
    Monitored(FanMonitor),
    Unavailable(String),
}

impl FanChannel {
    pub fn name(&self) -> &str {
        match self {
            FanChannel::Monitored(monitor) => monitor.name(),
            FanChannel::Unavailable(name) => name,
        }
    }

    fn read_rpm(&mut self) -> Option<f64> {
        match self {
            FanChannel::Monitored(monitor) => monitor.update_rpm().value(),
            FanChannel::Unavailable(_) => None,
        }
    }
}

/// Resolve the tachometer capability once. Without an edge source, or when
/// a line cannot be claimed, the fan's column stays empty for the session.
pub fn fan_channels(specs: &[FanSpec], source: Option<SharedEdgeSource>) -> Vec<FanChannel> {
    let Some(source) = source else {
        if !specs.is_empty() {
            tracing::warn!("tachometer monitoring disabled: no edge source available");
        }
        return specs
            .iter()
            .map(|spec| FanChannel::Unavailable(spec.name.clone()))
            .collect();
    };

    specs
        .iter()
        .map(|spec| {
            let started =
                FanMonitor::start(spec.name.clone(), spec.line, spec.config, source.clone());
            match started {
                Ok(monitor) => FanChannel::Monitored(monitor),
                Err(err) => {
                    tracing::warn!(fan = %spec.name, error = %err, "tachometer unavailable");
                    FanChannel::Unavailable(spec.name.clone())
                }
            }
        })
        .collect()
}

pub struct SampleAssembler {
    position: Arc<FixStateAggregator>,
    fans: Vec<FanChannel>,
    particulate: Option<Arc<dyn ParticulateSensor>>,
    gas: Vec<(GasChannel, Arc<dyn GasSensor>)>,
}

impl SampleAssembler {
    pub fn new(position: Arc<FixStateAggregator>) -> Self {
        Self {
            position,
            fans: Vec::new(),
            particulate: None,
            gas: Vec::new(),
        }
    }

    pub fn with_fans(mut self, fans: Vec<FanChannel>) -> Self {
        self.fans = fans;
        self
    }

    pub fn with_particulate(mut self, sensor: Arc<dyn ParticulateSensor>) -> Self {
        self.particulate = Some(sensor);
        self
    }

    pub fn with_gas_sensor(mut self, channel: GasChannel, sensor: Arc<dyn GasSensor>) -> Self {
        self.gas.retain(|(existing, _)| *existing != channel);
        self.gas.push((channel, sensor));
        self
    }

    /// Header matching the rows this assembler produces
    pub fn layout(&self) -> ColumnLayout {
        let names: Vec<&str> = self.fans.iter().map(FanChannel::name).collect();
        ColumnLayout::new(&names)
    }

    pub async fn assemble(&mut self, timestamp: DateTime<Local>) -> SampleRow {
        let mut row = SampleRow::empty(timestamp, self.fans.len());
        row.position = self.position.snapshot();

        for (slot, fan) in row.fan_rpm.iter_mut().zip(self.fans.iter_mut()) {
            *slot = fan.read_rpm();
        }

        let particulate = async {
            match &self.particulate {
                Some(sensor) => sensor.read().await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "particulate sensor read failed");
                    Sen66Reading::default()
                }),
                None => Sen66Reading::default(),
            }
        };

        let gas = join_all(self.gas.iter().map(|(channel, sensor)| async move {
            let reading = sensor.read().await.unwrap_or_else(|err| {
                tracing::warn!(gas = channel.name(), error = %err, "gas sensor read failed");
                GasReading::default()
            });
            (*channel, reading)
        }));

        let (particulate, gas) = futures::join!(particulate, gas);
        row.particulate = particulate;
        for (channel, reading) in gas {
            row.set_gas_reading(channel, reading);
        }

        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tachometer::{EdgeSender, EdgeSource, EdgeSourceError, TachometerConfig};
    use crate::domain::position::FixStatus;
    use crate::domain::sentence::{NmeaSentence, RmcFields};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Delivers one 20 ms pulse interval on every line except 13
    #[derive(Default)]
    struct SteadyLines {
        held: Vec<EdgeSender>,
    }

    impl EdgeSource for SteadyLines {
        fn watch(&mut self, line: u32, edges: EdgeSender) -> Result<(), EdgeSourceError> {
            if line == 13 {
                return Err(EdgeSourceError::LineUnavailable {
                    line,
                    reason: "claimed by another process".to_string(),
                });
            }
            let now = Instant::now();
            edges.on_edge(now - Duration::from_millis(20));
            edges.on_edge(now);
            self.held.push(edges);
            Ok(())
        }

        fn release(&mut self, _line: u32) {}
    }

    fn spec(name: &str, line: u32) -> FanSpec {
        FanSpec {
            name: name.to_string(),
            line,
            config: TachometerConfig {
                pulses_per_revolution: 2,
                stall_timeout: Duration::from_secs(30),
            },
        }
    }

    struct FixedParticulate;

    #[async_trait]
    impl ParticulateSensor for FixedParticulate {
        async fn read(&self) -> anyhow::Result<Sen66Reading> {
            Ok(Sen66Reading {
                pm2p5: Some(7.5),
                co2: Some(612.0),
                ..Default::default()
            })
        }
    }

    struct FixedGas(i64);

    #[async_trait]
    impl GasSensor for FixedGas {
        async fn read(&self) -> anyhow::Result<GasReading> {
            Ok(GasReading {
                gas_ppb: Some(self.0),
                ..Default::default()
            })
        }
    }

    struct BrokenGas;

    #[async_trait]
    impl GasSensor for BrokenGas {
        async fn read(&self) -> anyhow::Result<GasReading> {
            anyhow::bail!("no response on serial line")
        }
    }

    #[tokio::test]
    async fn test_assemble_pulls_every_source() {
        let position = Arc::new(FixStateAggregator::new());
        position.ingest(&NmeaSentence::Rmc(RmcFields {
            status: Some(FixStatus::Active),
            latitude: Some(12.5),
            longitude: Some(-3.25),
            speed_knots: Some(0.0),
        }));

        let mut assembler = SampleAssembler::new(position)
            .with_fans(vec![
                FanChannel::Unavailable("fan1".to_string()),
                FanChannel::Unavailable("fan2".to_string()),
            ])
            .with_particulate(Arc::new(FixedParticulate))
            .with_gas_sensor(GasChannel::Co, Arc::new(FixedGas(250)))
            .with_gas_sensor(GasChannel::O3, Arc::new(FixedGas(31)));

        let row = assembler.assemble(Local::now()).await;

        assert_eq!(row.position.latitude, Some(12.5));
        assert_eq!(row.fan_rpm, vec![None, None]);
        assert_eq!(row.particulate.pm2p5, Some(7.5));
        assert_eq!(row.gas_reading(GasChannel::Co).gas_ppb, Some(250));
        assert_eq!(row.gas_reading(GasChannel::No2).gas_ppb, None);
        assert_eq!(row.gas_reading(GasChannel::O3).gas_ppb, Some(31));
        assert_eq!(row.to_record().len(), assembler.layout().len());
    }

    #[tokio::test]
    async fn test_failed_sensor_is_empty_for_that_tick_only() {
        let mut assembler = SampleAssembler::new(Arc::new(FixStateAggregator::new()))
            .with_gas_sensor(GasChannel::Co, Arc::new(BrokenGas))
            .with_gas_sensor(GasChannel::No2, Arc::new(FixedGas(40)));

        let row = assembler.assemble(Local::now()).await;

        assert_eq!(row.gas_reading(GasChannel::Co), &GasReading::default());
        assert_eq!(row.gas_reading(GasChannel::No2).gas_ppb, Some(40));
        assert_eq!(row.position.fix_status, FixStatus::Unknown);
    }

    #[tokio::test]
    async fn test_fan_capability_resolved_once() {
        let specs = [spec("fan1", 6), spec("fan2", 13)];
        let source: SharedEdgeSource = Arc::new(Mutex::new(SteadyLines::default()));

        let mut assembler = SampleAssembler::new(Arc::new(FixStateAggregator::new()))
            .with_fans(fan_channels(&specs, Some(source)));
        let row = assembler.assemble(Local::now()).await;

        let fan1 = row.fan_rpm[0].unwrap();
        assert!((fan1 - 1500.0).abs() < 1e-6, "fan1 = {fan1}");
        assert_eq!(row.fan_rpm[1], None);
    }

    #[test]
    fn test_no_edge_source_leaves_fans_unknown() {
        let channels = fan_channels(&[spec("fan1", 6), spec("fan2", 26)], None);
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| matches!(c, FanChannel::Unavailable(_))));
        assert_eq!(channels[1].name(), "fan2");
    }

    #[test]
    fn test_layout_follows_fan_order() {
        let assembler = SampleAssembler::new(Arc::new(FixStateAggregator::new())).with_fans(vec![
            FanChannel::Unavailable("intake".to_string()),
            FanChannel::Unavailable("exhaust".to_string()),
        ]);

        let layout = assembler.layout();
        assert_eq!(layout.columns()[11], "intake_rpm");
        assert_eq!(layout.columns()[12], "exhaust_rpm");
    }
}
