// NMEA 0183 line decoder for the RMC, GGA and GSA sentences
use crate::domain::position::FixStatus;
use crate::domain::sentence::{GgaFields, GsaFields, NmeaSentence, RmcFields};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,
    #[error("not an NMEA sentence: {0:?}")]
    NotNmea(String),
    #[error("unsupported sentence type {0}")]
    Unsupported(String),
}

/// Decode one line. Any talker ID is accepted; the `*hh` checksum suffix is
/// dropped unchecked. Unparseable fields decode as `None`.
pub fn decode_line(line: &str) -> Result<NmeaSentence, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }
    let Some(body) = line.strip_prefix('$') else {
        return Err(DecodeError::NotNmea(line.to_string()));
    };
    let body = body.rsplit_once('*').map_or(body, |(payload, _checksum)| payload);

    let fields: Vec<&str> = body.split(',').collect();
    let address = fields[0];
    if address.len() < 5 || !address.is_ascii() {
        return Err(DecodeError::NotNmea(line.to_string()));
    }
    let sentence_type = &address[address.len() - 3..];
    let field = |index: usize| fields.get(index).copied().unwrap_or("");

    match sentence_type {
        "RMC" => Ok(NmeaSentence::Rmc(RmcFields {
            status: FixStatus::from_rmc_flag(field(2)),
            latitude: coordinate(field(3), field(4), 'N', 'S'),
            longitude: coordinate(field(5), field(6), 'E', 'W'),
            speed_knots: number(field(7)),
        })),
        "GGA" => Ok(NmeaSentence::Gga(GgaFields {
            quality: integer(field(6)),
            satellites: integer(field(7)),
            hdop: number(field(8)),
            altitude_m: number(field(9)),
        })),
        "GSA" => Ok(NmeaSentence::Gsa(GsaFields {
            pdop: number(field(15)),
            hdop: number(field(16)),
            vdop: number(field(17)),
        })),
        other => Err(DecodeError::Unsupported(other.to_string())),
    }
}

fn number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn integer(raw: &str) -> Option<u8> {
    raw.trim().parse::<u8>().ok()
}

/// `ddmm.mmmm` (or `dddmm.mmmm`) plus hemisphere to signed decimal degrees
fn coordinate(raw: &str, hemisphere: &str, positive: char, negative: char) -> Option<f64> {
    let value = number(raw)?;
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    match hemisphere.trim().chars().next()? {
        c if c == positive => Some(decimal),
        c if c == negative => Some(-decimal),
        _ => None,
    }
}
