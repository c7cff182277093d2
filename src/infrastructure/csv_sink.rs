// Buffered CSV sink - In-memory row queue flushed to disk in whole batches
use crate::application::sample_sink::SampleSink;
use crate::domain::sample::{ColumnLayout, SampleRow};
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("row has {found} columns, header has {expected}")]
    ColumnCount { expected: usize, found: usize },
    #[error("failed to encode CSV rows: {0}")]
    Encode(#[from] csv::Error),
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only target of one flush
trait BatchFile: Write + Send {
    fn len(&self) -> std::io::Result<u64>;
    fn sync_data(&self) -> std::io::Result<()>;
    fn set_len(&self, len: u64) -> std::io::Result<()>;
}

impl BatchFile for File {
    fn len(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync_data(&self) -> std::io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> std::io::Result<()> {
        File::set_len(self, len)
    }
}

type BatchOpener = fn(&Path) -> std::io::Result<Box<dyn BatchFile>>;

fn open_append(path: &Path) -> std::io::Result<Box<dyn BatchFile>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

pub struct BufferedCsvSink {
    path: PathBuf,
    header: Vec<String>,
    buffer: Vec<SampleRow>,
    flush_interval: Duration,
    last_flush: Instant,
    open: BatchOpener,
}

impl BufferedCsvSink {
    pub fn new(path: impl Into<PathBuf>, layout: &ColumnLayout, flush_interval: Duration) -> Self {
        Self {
            path: path.into(),
            header: layout.columns().to_vec(),
            buffer: Vec::new(),
            flush_interval,
            last_flush: Instant::now(),
            open: open_append,
        }
    }

    /// `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.csv`
    pub fn session_path(dir: &Path, prefix: &str, started: DateTime<Local>) -> PathBuf {
        dir.join(format!("{}_{}.csv", prefix, started.format("%Y%m%d_%H%M%S")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn append(&mut self, row: SampleRow) -> Result<(), SinkError> {
        let found = row.to_record().len();
        if found != self.header.len() {
            return Err(SinkError::ColumnCount {
                expected: self.header.len(),
                found,
            });
        }
        self.buffer.push(row);
        Ok(())
    }

    pub fn flush_if_due(&mut self, now: Instant) -> Result<usize, SinkError> {
        if now.saturating_duration_since(self.last_flush) < self.flush_interval {
            return Ok(0);
        }
        self.flush_now()
    }

    /// Write every buffered row in one append. The buffer is cleared only
    /// after the whole batch is on disk.
    pub fn flush_now(&mut self) -> Result<usize, SinkError> {
        if self.buffer.is_empty() {
            self.last_flush = Instant::now();
            return Ok(0);
        }

        let mut file = (self.open)(&self.path).map_err(|source| self.io_error(source))?;
        let start_len = file.len().map_err(|source| self.io_error(source))?;

        let batch = self.encode(start_len == 0)?;
        if let Err(source) = file.write_all(&batch).and_then(|_| file.sync_data()) {
            // Roll back a partial batch so the retry cannot duplicate rows
            if let Err(err) = file.set_len(start_len) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to roll back partial CSV write"
                );
            }
            return Err(self.io_error(source));
        }

        let written = self.buffer.len();
        self.buffer.clear();
        self.last_flush = Instant::now();
        tracing::debug!(path = %self.path.display(), rows = written, "CSV batch written");
        Ok(written)
    }

    fn encode(&self, with_header: bool) -> Result<Vec<u8>, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if with_header {
            writer.write_record(&self.header)?;
        }
        for row in &self.buffer {
            writer.write_record(row.to_record())?;
        }
        writer
            .into_inner()
            .map_err(|err| SinkError::Encode(csv::Error::from(err.into_error())))
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SampleSink for BufferedCsvSink {
    fn append(&mut self, row: SampleRow) -> anyhow::Result<()> {
        Ok(BufferedCsvSink::append(self, row)?)
    }

    fn flush_if_due(&mut self, now: Instant) -> anyhow::Result<usize> {
        Ok(BufferedCsvSink::flush_if_due(self, now)?)
    }

    fn flush_now(&mut self) -> anyhow::Result<usize> {
        Ok(BufferedCsvSink::flush_now(self)?)
    }

    fn buffered(&self) -> usize {
        BufferedCsvSink::buffered(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::FixStatus;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn layout() -> ColumnLayout {
        ColumnLayout::new(&["fan1", "fan2"])
    }

    fn row(seq: u32) -> SampleRow {
        let timestamp = Local.with_ymd_and_hms(2025, 6, 1, 12, 0, seq).unwrap();
        let mut row = SampleRow::empty(timestamp, 2);
        row.position.fix_status = FixStatus::Active;
        row.position.latitude = Some(40.0 + seq as f64 / 100.0);
        row.position.satellites_in_use = Some(seq as u8);
        row.fan_rpm[0] = Some(1500.0 + seq as f64);
        row
    }

    fn read_back(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader.headers().unwrap().iter().map(String::from).collect();
        let records = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (header, records)
    }

    #[test]
    fn test_flush_now_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");
        let mut sink = BufferedCsvSink::new(&path, &layout(), Duration::from_secs(60));

        let rows: Vec<SampleRow> = (0..5).map(row).collect();
        for r in &rows {
            sink.append(r.clone()).unwrap();
        }
        assert!(!path.exists());

        assert_eq!(sink.flush_now().unwrap(), 5);
        assert_eq!(sink.buffered(), 0);

        let (header, records) = read_back(&path);
        assert_eq!(header, layout().columns());
        let expected: Vec<Vec<String>> = rows.iter().map(SampleRow::to_record).collect();
        assert_eq!(records, expected);
    }

    #[test]
    fn test_header_written_once_across_flushes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");
        let mut sink = BufferedCsvSink::new(&path, &layout(), Duration::from_secs(60));

        for batch in [0..2, 2..3, 3..7] {
            for seq in batch {
                sink.append(row(seq)).unwrap();
            }
            sink.flush_now().unwrap();
        }
        // An empty flush must not add anything either
        assert_eq!(sink.flush_now().unwrap(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        let header_lines = content
            .lines()
            .filter(|line| line.starts_with("timestamp,"))
            .count();
        assert_eq!(header_lines, 1);

        let (_, records) = read_back(&path);
        assert_eq!(records.len(), 7);
        assert_eq!(records[6], row(6).to_record());
    }

    #[test]
    fn test_failed_flush_keeps_rows_for_retry() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not-yet-created");
        let path = missing.join("session.csv");
        let mut sink = BufferedCsvSink::new(&path, &layout(), Duration::from_secs(60));

        let a = row(1);
        let b = row(2);
        sink.append(a.clone()).unwrap();
        sink.append(b.clone()).unwrap();

        let err = sink.flush_now().unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
        assert_eq!(sink.buffered(), 2);

        std::fs::create_dir(&missing).unwrap();
        assert_eq!(sink.flush_now().unwrap(), 2);

        let (_, records) = read_back(&path);
        assert_eq!(records, vec![a.to_record(), b.to_record()]);
    }

    /// Lets the first `BUDGET` bytes through, then fails like a full disk
    struct ShortWrite {
        inner: File,
        budget: usize,
    }

    const BUDGET: usize = 64;

    impl Write for ShortWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("no space left on device"));
            }
            let take = buf.len().min(self.budget);
            let written = self.inner.write(&buf[..take])?;
            self.budget -= written;
            Ok(written)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl BatchFile for ShortWrite {
        fn len(&self) -> std::io::Result<u64> {
            self.inner.len()
        }

        fn sync_data(&self) -> std::io::Result<()> {
            File::sync_data(&self.inner)
        }

        fn set_len(&self, len: u64) -> std::io::Result<()> {
            File::set_len(&self.inner, len)
        }
    }

    fn open_short(path: &Path) -> std::io::Result<Box<dyn BatchFile>> {
        let inner = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(ShortWrite {
            inner,
            budget: BUDGET,
        }))
    }

    #[test]
    fn test_interrupted_write_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");
        let mut sink = BufferedCsvSink::new(&path, &layout(), Duration::from_secs(60));

        let first = row(0);
        sink.append(first.clone()).unwrap();
        sink.flush_now().unwrap();
        let committed = std::fs::read(&path).unwrap();

        let a = row(1);
        let b = row(2);
        sink.append(a.clone()).unwrap();
        sink.append(b.clone()).unwrap();

        sink.open = open_short;
        let err = sink.flush_now().unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
        assert_eq!(sink.buffered(), 2);
        assert_eq!(std::fs::read(&path).unwrap(), committed);

        sink.open = open_append;
        assert_eq!(sink.flush_now().unwrap(), 2);

        let (header, records) = read_back(&path);
        assert_eq!(header, layout().columns().to_vec());
        assert_eq!(records, vec![first.to_record(), a.to_record(), b.to_record()]);
    }

    #[test]
    fn test_flush_if_due_waits_for_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");
        let mut sink = BufferedCsvSink::new(&path, &layout(), Duration::from_secs(60));
        let start = Instant::now();

        sink.append(row(0)).unwrap();
        sink.append(row(1)).unwrap();

        assert_eq!(sink.flush_if_due(start).unwrap(), 0);
        assert_eq!(sink.buffered(), 2);
        assert!(!path.exists());

        assert_eq!(sink.flush_if_due(start + Duration::from_secs(61)).unwrap(), 2);
        assert_eq!(sink.buffered(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_rejects_row_of_wrong_width() {
        let dir = TempDir::new().unwrap();
        let mut sink = BufferedCsvSink::new(
            dir.path().join("session.csv"),
            &layout(),
            Duration::from_secs(60),
        );

        let three_fans = SampleRow::empty(Local::now(), 3);
        let err = sink.append(three_fans).unwrap_err();
        assert!(matches!(err, SinkError::ColumnCount { expected: 46, found: 47 }));
        assert_eq!(sink.buffered(), 0);
    }

    #[test]
    fn test_session_path_format() {
        let started = Local.with_ymd_and_hms(2025, 3, 9, 7, 5, 3).unwrap();
        let path = BufferedCsvSink::session_path(Path::new("/data"), "MAQM_data", started);
        assert_eq!(path, PathBuf::from("/data/MAQM_data_20250309_070503.csv"));
    }
}
