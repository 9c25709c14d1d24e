use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Wall-clock instant with nanosecond precision, as carried on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Adds `nanos`, carrying into the seconds component.
    pub fn plus_nanos(self, nanos: u64) -> Self {
        let total = u64::from(self.nanos) + nanos;
        Self {
            seconds: self.seconds + (total / NANOS_PER_SECOND) as i64,
            nanos: (total % NANOS_PER_SECOND) as u32,
        }
    }

    pub fn minus(self, duration: Duration) -> Self {
        let own = i128::from(self.seconds) * i128::from(NANOS_PER_SECOND) + i128::from(self.nanos);
        let shifted = own - duration.as_nanos() as i128;
        Self {
            seconds: shifted.div_euclid(i128::from(NANOS_PER_SECOND)) as i64,
            nanos: shifted.rem_euclid(i128::from(NANOS_PER_SECOND)) as u32,
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        let since_epoch = value.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            seconds: since_epoch.as_secs() as i64,
            nanos: since_epoch.subsec_nanos(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}
