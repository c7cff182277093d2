// Sample row domain model - one flat record per sampling tick
use super::position::PositionRecord;
use chrono::{DateTime, Local, SecondsFormat};
use thiserror::Error;

const GNSS_COLUMNS: [&str; 10] = [
    "gnss_lat",
    "gnss_lon",
    "gnss_alt",
    "gnss_speed",
    "gnss_fix_status",
    "gnss_quality",
    "gnss_num_sv",
    "gnss_pdop",
    "gnss_hdop",
    "gnss_vdop",
];

const SEN66_COLUMNS: [&str; 9] = [
    "pm1p0",
    "pm2p5",
    "pm4p0",
    "pm10p0",
    "sen66_humidity",
    "sen66_temperature",
    "voc_index",
    "nox_index",
    "co2",
];

const GAS_COLUMN_SUFFIXES: [&str; 8] = [
    "sensor_sn",
    "ppb",
    "ppm",
    "temperature_c",
    "humidity_pct",
    "adc_g",
    "adc_t",
    "adc_h",
];

/// Particulate / VOC / NOx / CO2 readings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sen66Reading {
    pub pm1p0: Option<f64>,
    pub pm2p5: Option<f64>,
    pub pm4p0: Option<f64>,
    pub pm10p0: Option<f64>,
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
    pub voc_index: Option<f64>,
    pub nox_index: Option<f64>,
    pub co2: Option<f64>,
}

impl Sen66Reading {
    fn values(&self) -> [Option<f64>; 9] {
        [
            self.pm1p0,
            self.pm2p5,
            self.pm4p0,
            self.pm10p0,
            self.humidity,
            self.temperature,
            self.voc_index,
            self.nox_index,
            self.co2,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasChannel {
    Co,
    No2,
    O3,
}

impl GasChannel {
    /// Column order of the gas sensor blocks
    pub const ALL: [GasChannel; 3] = [GasChannel::Co, GasChannel::No2, GasChannel::O3];

    pub fn name(&self) -> &'static str {
        match self {
            GasChannel::Co => "co",
            GasChannel::No2 => "no2",
            GasChannel::O3 => "o3",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GasRecordError {
    #[error("gas record has {0} fields, expected at least 7")]
    TooFewFields(usize),
    #[error("gas record field {index} is not an integer: {value:?}")]
    NotInteger { index: usize, value: String },
}

/// One record from an electrochemical gas sensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GasReading {
    pub sensor_sn: Option<String>,
    pub gas_ppb: Option<i64>,
    pub gas_ppm: Option<f64>,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub adc_g: Option<i64>,
    pub adc_t: Option<i64>,
    pub adc_h: Option<i64>,
}

impl GasReading {
    /// Parse a `SN, PPB, T*100, RH*100, ADC_G, ADC_T, ADC_H[, ...]` record
    pub fn parse_record(line: &str) -> Result<Self, GasRecordError> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(GasRecordError::TooFewFields(fields.len()));
        }

        let int_at = |index: usize| -> Result<i64, GasRecordError> {
            fields[index]
                .parse::<i64>()
                .map_err(|_| GasRecordError::NotInteger {
                    index,
                    value: fields[index].to_string(),
                })
        };

        let ppb = int_at(1)?;
        let temp_raw = int_at(2)?;
        let rh_raw = int_at(3)?;

        Ok(Self {
            sensor_sn: Some(fields[0].to_string()),
            gas_ppb: Some(ppb),
            gas_ppm: Some(ppb as f64 / 1000.0),
            temperature_c: Some(temp_raw as f64 / 100.0),
            humidity_pct: Some(rh_raw as f64 / 100.0),
            adc_g: Some(int_at(4)?),
            adc_t: Some(int_at(5)?),
            adc_h: Some(int_at(6)?),
        })
    }

    fn cells(&self) -> [String; 8] {
        [
            self.sensor_sn.clone().unwrap_or_default(),
            cell(self.gas_ppb),
            cell(self.gas_ppm),
            cell(self.temperature_c),
            cell(self.humidity_pct),
            cell(self.adc_g),
            cell(self.adc_t),
            cell(self.adc_h),
        ]
    }
}

/// Header row for one output file. Built once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    columns: Vec<String>,
    fan_count: usize,
}

impl ColumnLayout {
    pub fn new<S: AsRef<str>>(fan_names: &[S]) -> Self {
        let mut columns = Vec::with_capacity(1 + GNSS_COLUMNS.len() + fan_names.len() + 9 + 24);
        columns.push("timestamp".to_string());
        columns.extend(GNSS_COLUMNS.iter().map(|c| c.to_string()));
        columns.extend(fan_names.iter().map(|name| format!("{}_rpm", name.as_ref())));
        columns.extend(SEN66_COLUMNS.iter().map(|c| c.to_string()));
        for channel in GasChannel::ALL {
            columns.extend(
                GAS_COLUMN_SUFFIXES
                    .iter()
                    .map(|suffix| format!("spec_{}_{}", channel.name(), suffix)),
            );
        }

        Self {
            columns,
            fan_count: fan_names.len(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn fan_count(&self) -> usize {
        self.fan_count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub timestamp: DateTime<Local>,
    pub position: PositionRecord,
    /// One entry per configured fan, in layout order
    pub fan_rpm: Vec<Option<f64>>,
    pub particulate: Sen66Reading,
    /// Indexed like `GasChannel::ALL`
    pub gas: [GasReading; 3],
}

impl SampleRow {
    pub fn empty(timestamp: DateTime<Local>, fan_count: usize) -> Self {
        Self {
            timestamp,
            position: PositionRecord::default(),
            fan_rpm: vec![None; fan_count],
            particulate: Sen66Reading::default(),
            gas: Default::default(),
        }
    }

    pub fn gas_reading(&self, channel: GasChannel) -> &GasReading {
        &self.gas[channel_index(channel)]
    }

    pub fn set_gas_reading(&mut self, channel: GasChannel, reading: GasReading) {
        self.gas[channel_index(channel)] = reading;
    }

    /// Render one CSV record; unavailable values are empty strings
    pub fn to_record(&self) -> Vec<String> {
        let p = &self.position;
        let mut record = Vec::with_capacity(1 + 10 + self.fan_rpm.len() + 9 + 24);
        record.push(
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, false),
        );
        record.push(cell(p.latitude));
        record.push(cell(p.longitude));
        record.push(cell(p.altitude_m));
        record.push(cell(p.speed_knots));
        record.push(p.fix_status.as_csv().to_string());
        record.push(cell(p.fix_quality));
        record.push(cell(p.satellites_in_use));
        record.push(cell(p.pdop));
        record.push(cell(p.hdop));
        record.push(cell(p.vdop));
        record.extend(self.fan_rpm.iter().map(|rpm| cell(*rpm)));
        record.extend(self.particulate.values().into_iter().map(cell));
        for reading in &self.gas {
            record.extend(reading.cells());
        }
        record
    }
}

fn channel_index(channel: GasChannel) -> usize {
    match channel {
        GasChannel::Co => 0,
        GasChannel::No2 => 1,
        GasChannel::O3 => 2,
    }
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
