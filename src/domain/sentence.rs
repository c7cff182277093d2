// Decoded NMEA sentence model
//
// Absent or non-numeric fields are `None`; they never default to zero.
use super::position::FixStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum NmeaSentence {
    Rmc(RmcFields),
    Gga(GgaFields),
    Gsa(GsaFields),
}

impl NmeaSentence {
    pub fn kind(&self) -> &'static str {
        match self {
            NmeaSentence::Rmc(_) => "RMC",
            NmeaSentence::Gga(_) => "GGA",
            NmeaSentence::Gsa(_) => "GSA",
        }
    }
}

/// Recommended minimum data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmcFields {
    pub status: Option<FixStatus>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_knots: Option<f64>,
}

/// Fix data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgaFields {
    pub quality: Option<u8>,
    pub satellites: Option<u8>,
    pub altitude_m: Option<f64>,
    pub hdop: Option<f64>,
}

/// DOP and active satellites
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GsaFields {
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}
