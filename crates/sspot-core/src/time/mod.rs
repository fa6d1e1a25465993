//! Wall-clock time: NTP anchoring, timezone offsets and calendar breakdown

pub mod calendar;
pub mod ntp;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use calendar::{SECONDS_PER_DAY, civil_from_days, last_sunday_of};
use ntp::{NtpTimestamp, SntpError};

/// Broken-down calendar time, no timezone attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Break down seconds relative to 1970-01-01T00:00:00
    pub const fn from_epoch_secs(secs: i64) -> Self {
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let secs_of_day = secs.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        Self {
            year,
            month,
            day,
            hour: (secs_of_day / 3600) as u8,
            minute: ((secs_of_day % 3600) / 60) as u8,
            second: (secs_of_day % 60) as u8,
        }
    }
}

/// Rule deciding whether daylight saving time is in effect
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaylightRule {
    /// Never apply the daylight offset
    None,
    /// Last Sunday of March 01:00 UTC until last Sunday of October 01:00 UTC
    EuropeanUnion,
}

/// Fixed base offset plus an optional daylight adjustment
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeZone {
    pub base_offset_secs: i32,
    pub daylight_offset_secs: i32,
    pub daylight_rule: DaylightRule,
}

impl Default for TimeZone {
    fn default() -> Self {
        Self {
            base_offset_secs: 3600,
            daylight_offset_secs: 3600,
            daylight_rule: DaylightRule::EuropeanUnion,
        }
    }
}

impl TimeZone {
    pub fn is_daylight(&self, utc_secs: i64) -> bool {
        match self.daylight_rule {
            DaylightRule::None => false,
            DaylightRule::EuropeanUnion => {
                let year = DateTime::from_epoch_secs(utc_secs).year;
                let start = last_sunday_of(year, 3) * SECONDS_PER_DAY + 3600;
                let end = last_sunday_of(year, 10) * SECONDS_PER_DAY + 3600;
                (start..end).contains(&utc_secs)
            }
        }
    }

    /// Effective offset from UTC at the given instant
    pub fn offset_at(&self, utc_secs: i64) -> i32 {
        if self.is_daylight(utc_secs) {
            self.base_offset_secs + self.daylight_offset_secs
        } else {
            self.base_offset_secs
        }
    }
}

/// Anything that can tell the local wall-clock time
pub trait Clock {
    fn now(&self) -> DateTime;

    /// Whether the clock was ever set from a time source
    fn is_synchronized(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    unix_secs: u64,
    uptime_secs: u64,
}

/// Wall clock derived from a monotonic uptime counter.
///
/// Until synchronised the uptime itself is treated as seconds since the epoch,
/// so timestamps start at 1970-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WallClock {
    anchor: Option<Anchor>,
    offset_secs: i32,
}

impl WallClock {
    pub const fn unsynchronized() -> Self {
        Self {
            anchor: None,
            offset_secs: 0,
        }
    }

    pub const fn is_synchronized(&self) -> bool {
        self.anchor.is_some()
    }

    pub const fn offset_secs(&self) -> i32 {
        self.offset_secs
    }

    /// Anchor the clock: `unix_secs` was true at `uptime_secs`.
    pub fn set(&mut self, unix_secs: u64, uptime_secs: u64, offset_secs: i32) {
        self.anchor = Some(Anchor {
            unix_secs,
            uptime_secs,
        });
        self.offset_secs = offset_secs;
    }

    pub fn utc_at(&self, uptime_secs: u64) -> i64 {
        match self.anchor {
            Some(anchor) => {
                anchor.unix_secs as i64 + uptime_secs as i64 - anchor.uptime_secs as i64
            }
            None => uptime_secs as i64,
        }
    }

    pub fn local_at(&self, uptime_secs: u64) -> DateTime {
        DateTime::from_epoch_secs(self.utc_at(uptime_secs) + self.offset_secs as i64)
    }

    /// Apply the outcome of an NTP query.
    ///
    /// The clock is first set with zero offset, then the effective offset is
    /// recomputed from the resulting UTC time and applied. On failure nothing
    /// changes and callers keep whatever time the clock already had.
    pub fn synchronize(
        &mut self,
        result: Result<NtpTimestamp, SntpError>,
        uptime_secs: u64,
        zone: &TimeZone,
    ) -> Result<i32, SntpError> {
        let timestamp = match result {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!("Failed to obtain time: {}", e);
                return Err(e);
            }
        };

        self.set(timestamp.unix_secs, uptime_secs, 0);

        let utc = self.utc_at(uptime_secs);
        let offset = zone.offset_at(utc);
        self.offset_secs = offset;

        info!(
            "Clock set to {} UTC, offset {}s (daylight: {})",
            timestamp.unix_secs,
            offset,
            zone.is_daylight(utc)
        );
        Ok(offset)
    }
}
