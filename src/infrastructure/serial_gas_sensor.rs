// Serial-line gas sensor adapter - one request/response record per read
use crate::application::sensor_sources::GasSensor;
use crate::domain::sample::GasReading;
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

/// Opens the link to one sensor. A fresh link is opened for every request
/// and closed with it, so a request that times out leaves nothing behind.
pub trait PortOpener: Send + Sync {
    type Port: AsyncRead + AsyncWrite + Unpin + Send;

    fn name(&self) -> &str;

    fn open(&self) -> anyhow::Result<Self::Port>;
}

/// 8N1 UART without flow control
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    path: String,
    baud_rate: u32,
}

impl SerialPortOpener {
    pub fn new(path: &Path, baud_rate: u32) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            baud_rate,
        }
    }
}

impl PortOpener for SerialPortOpener {
    type Port = SerialStream;

    fn name(&self) -> &str {
        &self.path
    }

    fn open(&self) -> anyhow::Result<SerialStream> {
        let port = tokio_serial::new(self.path.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .with_context(|| format!("failed to open {}", self.path))?;

        // Drop anything the sensor sent since the last request
        port.clear(ClearBuffer::Input)
            .with_context(|| format!("failed to clear input on {}", self.path))?;
        Ok(port)
    }
}

/// A carriage return triggers one measurement record from the sensor.
#[derive(Debug, Clone)]
pub struct SerialLineGasSensor<O = SerialPortOpener> {
    opener: O,
    timeout: Duration,
}

impl SerialLineGasSensor {
    pub fn new(port: &Path, baud_rate: u32, timeout: Duration) -> Self {
        Self::with_opener(SerialPortOpener::new(port, baud_rate), timeout)
    }
}

impl<O: PortOpener> SerialLineGasSensor<O> {
    pub fn with_opener(opener: O, timeout: Duration) -> Self {
        Self { opener, timeout }
    }

    async fn request_record(&self) -> anyhow::Result<String> {
        let mut port = BufReader::new(self.opener.open()?);
        port.write_all(b"\r").await?;
        port.flush().await?;

        let mut line = String::new();
        port.read_line(&mut line).await?;
        Ok(line)
    }
}

#[async_trait]
impl<O: PortOpener> GasSensor for SerialLineGasSensor<O> {
    async fn read(&self) -> anyhow::Result<GasReading> {
        let name = self.opener.name();
        let line = tokio::time::timeout(self.timeout, self.request_record())
            .await
            .with_context(|| format!("no record from {} within {:?}", name, self.timeout))??;

        GasReading::parse_record(&line)
            .with_context(|| format!("bad record from {}: {:?}", name, line.trim()))
    }
}
