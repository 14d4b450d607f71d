use crate::error::TrendingError;
use chrono::{DateTime, Days, FixedOffset, LocalResult, NaiveTime, TimeZone, Utc};

/// Fires once a day at a fixed wall-clock time in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct DailyCadence {
    tz: FixedOffset,
    target: NaiveTime,
}

impl DailyCadence {
    pub fn new(tz: FixedOffset, hour: u32, minute: u32) -> Result<Self, TrendingError> {
        let target = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            TrendingError::Config(format!("invalid archive time: {hour:02}:{minute:02}"))
        })?;
        Ok(Self { tz, target })
    }

    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        self.tz
    }

    /// The first trigger at or after `now`.
    #[must_use]
    pub fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let localized_now = now.with_timezone(&self.tz);
        let mut date = localized_now.date_naive();
        if localized_now.time() > self.target {
            date = date.checked_add_days(Days::new(1)).unwrap_or(date);
        }

        let local_target = date.and_time(self.target);

        match self.tz.from_local_datetime(&local_target) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            // Fixed offsets have no gaps; fall back to reading the time as UTC.
            LocalResult::None => Utc.from_utc_datetime(&local_target),
        }
    }
}
