use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

/// Key prefix reserved for objects that expire.
pub const EXPIRING_PREFIX: &str = "upload-expires";

/// Longest accepted retention, about a century.
pub const MAX_EXPIRE_DAYS: u32 = 36_500;

/// Retention configured for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub days: u32,
}

impl ExpiryPolicy {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// The instant after which uploads are purged, or `None` when they are kept forever.
    ///
    /// `now` is truncated to midnight UTC and `days + 1` whole days are added, so an object
    /// uploaded late in the day still lives at least `days` full days. Retention is capped at
    /// [`MAX_EXPIRE_DAYS`].
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.days == 0 {
            return None;
        }
        let days = self.days.min(MAX_EXPIRE_DAYS);
        let midnight = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
        TimeDelta::try_days(i64::from(days) + 1)
            .and_then(|delta| midnight.checked_add_signed(delta))
    }

    pub fn expires_from_now(&self) -> Option<DateTime<Utc>> {
        self.expires_at(Utc::now())
    }
}

/// Place `key` under the expiring prefix.
pub fn expiring_key(key: &str) -> String {
    format!("{EXPIRING_PREFIX}/{key}")
}
