// Fix-state aggregator - Folds decoded NMEA sentences into one position record
use crate::domain::position::{FixStatus, PositionRecord};
use crate::domain::sentence::{GgaFields, GsaFields, NmeaSentence, RmcFields};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Owns the current `PositionRecord` behind a single lock so a snapshot
/// never observes a half-applied sentence.
#[derive(Debug, Default)]
pub struct FixStateAggregator {
    record: Mutex<PositionRecord>,
}

impl FixStateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one sentence. Missing fields leave the prior value in place.
    pub fn ingest(&self, sentence: &NmeaSentence) {
        let mut record = self.lock();
        match sentence {
            NmeaSentence::Rmc(fields) => apply_rmc(&mut record, fields),
            NmeaSentence::Gga(fields) => apply_gga(&mut record, fields),
            NmeaSentence::Gsa(fields) => apply_gsa(&mut record, fields),
        }
    }

    pub fn snapshot(&self) -> PositionRecord {
        *self.lock()
    }

    // The record is Copy and every write completes under the guard, so a
    // poisoned lock still holds a whole record.
    fn lock(&self) -> MutexGuard<'_, PositionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_rmc(record: &mut PositionRecord, fields: &RmcFields) {
    let Some(status) = fields.status else {
        return;
    };
    record.fix_status = status;

    // Void keeps the last known good position
    if status == FixStatus::Active {
        overwrite(&mut record.latitude, fields.latitude);
        overwrite(&mut record.longitude, fields.longitude);
        overwrite(&mut record.speed_knots, fields.speed_knots);
    }
}

fn apply_gga(record: &mut PositionRecord, fields: &GgaFields) {
    overwrite(&mut record.fix_quality, fields.quality);
    overwrite(&mut record.satellites_in_use, fields.satellites);
    overwrite(&mut record.altitude_m, fields.altitude_m);
    overwrite(&mut record.hdop, fields.hdop);
}

fn apply_gsa(record: &mut PositionRecord, fields: &GsaFields) {
    overwrite(&mut record.pdop, fields.pdop);
    overwrite(&mut record.hdop, fields.hdop);
    overwrite(&mut record.vdop, fields.vdop);
}

fn overwrite<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(value) = value {
        *slot = Some(value);
    }
}
