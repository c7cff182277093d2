// NMEA stream reader - Feeds newline-framed sentences into the aggregator
use crate::application::fix_aggregator::FixStateAggregator;
use crate::infrastructure::nmea_decoder::{DecodeError, decode_line};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub ingested: u64,
    pub skipped: u64,
}

/// Read the GNSS byte stream at `source` until it ends or fails
pub fn spawn_nmea_reader(
    source: PathBuf,
    baud_rate: u32,
    aggregator: Arc<FixStateAggregator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match read_source(&source, baud_rate, &aggregator).await {
            Ok(stats) => tracing::warn!(
                source = %source.display(),
                ingested = stats.ingested,
                skipped = stats.skipped,
                "GNSS stream ended"
            ),
            Err(err) => tracing::warn!(
                source = %source.display(),
                error = ?err,
                "GNSS source failed"
            ),
        }
    })
}

/// A character device is the receiver's serial port, anything else a
/// recorded NMEA log being replayed
async fn read_source(
    source: &Path,
    baud_rate: u32,
    aggregator: &FixStateAggregator,
) -> anyhow::Result<ReaderStats> {
    if is_serial_device(source) {
        let port = tokio_serial::new(source.to_string_lossy(), baud_rate)
            .open_native_async()
            .with_context(|| format!("cannot open GNSS port {}", source.display()))?;
        tracing::info!(source = %source.display(), baud_rate, "reading NMEA sentences");
        Ok(ingest_stream(BufReader::new(port), aggregator).await?)
    } else {
        let file = tokio::fs::File::open(source)
            .await
            .with_context(|| format!("cannot open GNSS log {}", source.display()))?;
        tracing::info!(source = %source.display(), "replaying NMEA log");
        Ok(ingest_stream(BufReader::new(file), aggregator).await?)
    }
}

#[cfg(unix)]
fn is_serial_device(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|meta| meta.file_type().is_char_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_serial_device(path: &Path) -> bool {
    !path.is_file()
}

/// Bytes that are not valid UTF-8 (binary UBX frames on the same port)
/// only spoil the line they appear on.
pub async fn ingest_stream<R>(
    reader: R,
    aggregator: &FixStateAggregator,
) -> std::io::Result<ReaderStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReaderStats::default();
    let mut lines = SplitStream::new(reader.split(b'\n'));

    while let Some(chunk) = lines.next().await {
        let chunk = chunk?;
        let line = String::from_utf8_lossy(&chunk);
        match decode_line(&line) {
            Ok(sentence) => {
                tracing::trace!(kind = sentence.kind(), "ingesting sentence");
                aggregator.ingest(&sentence);
                stats.ingested += 1;
            }
            Err(DecodeError::Empty) => {}
            Err(err) => {
                tracing::trace!(error = %err, "skipping line");
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}
