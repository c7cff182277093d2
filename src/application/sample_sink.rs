// Sample sink trait - where assembled rows go
use crate::domain::sample::SampleRow;
use std::time::Instant;

pub trait SampleSink: Send {
    /// Queue a row in memory. Never touches storage.
    fn append(&mut self, row: SampleRow) -> anyhow::Result<()>;

    /// Write the queue out if the flush interval has elapsed.
    /// Returns the number of rows written.
    fn flush_if_due(&mut self, now: Instant) -> anyhow::Result<usize>;

    /// Write the queue out unconditionally. On error the queue is kept.
    fn flush_now(&mut self) -> anyhow::Result<usize>;

    fn buffered(&self) -> usize;
}
