// Logging service - Fixed-rate sampling loop feeding the buffered sink
use crate::application::sample_assembler::SampleAssembler;
use crate::application::sample_sink::SampleSink;
use crate::domain::sample::{GasChannel, SampleRow};
use chrono::Local;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_sampled: u64,
    pub rows_written: u64,
    pub flush_failures: u64,
}

pub struct LoggingService<S: SampleSink> {
    assembler: SampleAssembler,
    sink: S,
    sample_interval: Duration,
}

impl<S: SampleSink> LoggingService<S> {
    pub fn new(assembler: SampleAssembler, sink: S, sample_interval: Duration) -> Self {
        Self {
            assembler,
            sink,
            sample_interval,
        }
    }

    /// Sample until `shutdown` resolves, then flush whatever is still buffered.
    /// Only the final flush can fail the run.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut summary = RunSummary::default();
        let mut ticker = tokio::time::interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_ms = self.sample_interval.as_millis() as u64,
            "starting data collection"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick(&mut summary).await;
                }
            }
        }

        tracing::info!(buffered = self.sink.buffered(), "stopping data collection");
        let written = self.sink.flush_now()?;
        summary.rows_written += written as u64;
        tracing::info!(
            rows_sampled = summary.rows_sampled,
            rows_written = summary.rows_written,
            flush_failures = summary.flush_failures,
            "shutdown complete"
        );
        Ok(summary)
    }

    async fn tick(&mut self, summary: &mut RunSummary) {
        let row = self.assembler.assemble(Local::now()).await;
        log_status(&row, self.sink.buffered() + 1);

        if let Err(err) = self.sink.append(row) {
            tracing::error!(error = %err, "sample row rejected");
            return;
        }
        summary.rows_sampled += 1;

        match self.sink.flush_if_due(Instant::now()) {
            Ok(0) => {}
            Ok(written) => {
                summary.rows_written += written as u64;
                tracing::info!(rows = written, "wrote samples to CSV");
            }
            Err(err) => {
                summary.flush_failures += 1;
                tracing::error!(
                    error = %err,
                    retained = self.sink.buffered(),
                    "CSV flush failed; rows kept for retry"
                );
            }
        }
    }
}

fn log_status(row: &SampleRow, buffered: usize) {
    let p = &row.position;
    let ppm = |channel: GasChannel| row.gas_reading(channel).gas_ppm;
    tracing::info!(
        fix = p.fix_status.as_csv(),
        lat = ?p.latitude,
        lon = ?p.longitude,
        speed_kn = ?p.speed_knots,
        sv = ?p.satellites_in_use,
        pdop = ?p.pdop,
        hdop = ?p.hdop,
        vdop = ?p.vdop,
        pm2p5 = ?row.particulate.pm2p5,
        co2 = ?row.particulate.co2,
        co_ppm = ?ppm(GasChannel::Co),
        no2_ppm = ?ppm(GasChannel::No2),
        o3_ppm = ?ppm(GasChannel::O3),
        fan_rpm = ?row.fan_rpm,
        buffered,
        "sample"
    );
}
