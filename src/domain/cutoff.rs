use crate::error::{Result, TransferError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Banking-day deadline for one destination routing number.
///
/// `cutoff` is a wall-clock value between 0 and 2400 (e.g. 1700 for 5pm)
/// interpreted in `zone`. Loaded fresh from the config store each cycle and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffTime {
    pub routing_number: String,
    pub cutoff: u16,
    pub zone: Tz,
}

impl CutoffTime {
    pub fn new(routing_number: impl Into<String>, cutoff: u16, zone: Tz) -> Result<Self> {
        if cutoff > 2400 || cutoff % 100 >= 60 {
            return Err(TransferError::Cutoff(format!(
                "clock value {cutoff} is not a valid HHMM"
            )));
        }
        Ok(Self {
            routing_number: routing_number.into(),
            cutoff,
            zone,
        })
    }

    /// Signed duration from `now` to today's occurrence of the cutoff in its
    /// own zone. Negative once the cutoff has passed.
    pub fn diff(&self, now: DateTime<Utc>) -> Duration {
        let local = now.with_timezone(&self.zone);
        let midnight = self
            .zone
            .from_local_datetime(
                &local
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time"),
            )
            .earliest()
            .unwrap_or(local);
        let cutoff = midnight
            + Duration::hours(i64::from(self.cutoff / 100))
            + Duration::minutes(i64::from(self.cutoff % 100));
        cutoff.signed_duration_since(local)
    }
}
