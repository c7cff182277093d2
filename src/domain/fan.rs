// Fan tachometer domain model

/// One tick's RPM estimate. `Unknown` is distinct from a stopped fan (`Rpm(0.0)`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RpmReading {
    #[default]
    Unknown,
    Rpm(f64),
}

impl RpmReading {
    pub fn value(&self) -> Option<f64> {
        match self {
            RpmReading::Unknown => None,
            RpmReading::Rpm(rpm) => Some(*rpm),
        }
    }
}

/// Rolling edge state published by the edge source: the latest edge and,
/// once two edges have been seen, the interval that ended at it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeObservation {
    pub last_edge: std::time::Instant,
    pub interval: Option<std::time::Duration>,
}
