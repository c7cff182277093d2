// GNSS position/quality domain model

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixStatus {
    Active,
    Void,
    #[default]
    Unknown,
}

impl FixStatus {
    /// Map the single-letter RMC status field ("A"/"V")
    pub fn from_rmc_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "A" => Some(FixStatus::Active),
            "V" => Some(FixStatus::Void),
            _ => None,
        }
    }

    /// Value written to the CSV column; unknown stays empty
    pub fn as_csv(&self) -> &'static str {
        match self {
            FixStatus::Active => "A",
            FixStatus::Void => "V",
            FixStatus::Unknown => "",
        }
    }
}

/// Latest known GNSS state. Every field starts unset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionRecord {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_knots: Option<f64>,
    pub fix_status: FixStatus,
    pub fix_quality: Option<u8>,
    pub satellites_in_use: Option<u8>,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}

impl PositionRecord {
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}
