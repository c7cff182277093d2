// Sensor collaborator traits for the non-GNSS instruments
use crate::domain::sample::{GasReading, Sen66Reading};
use async_trait::async_trait;

/// Particulate matter / VOC / NOx / CO2 sensor
#[async_trait]
pub trait ParticulateSensor: Send + Sync {
    async fn read(&self) -> anyhow::Result<Sen66Reading>;
}

/// Electrochemical gas sensor producing one record per request
#[async_trait]
pub trait GasSensor: Send + Sync {
    async fn read(&self) -> anyhow::Result<GasReading>;
}
