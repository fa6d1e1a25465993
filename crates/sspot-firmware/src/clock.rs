use embassy_time::Instant;

use sspot_core::time::ntp::{NtpTimestamp, SntpError};
use sspot_core::time::{Clock, DateTime, TimeZone, WallClock};

/// Seconds since boot
pub fn uptime_secs() -> u64 {
    Instant::now().as_secs()
}

/// Wall clock running off the embassy time driver
#[derive(Debug, Default)]
pub struct SystemClock {
    wall: WallClock,
}

impl SystemClock {
    pub const fn new() -> Self {
        Self {
            wall: WallClock::unsynchronized(),
        }
    }

    pub fn synchronize(
        &mut self,
        result: Result<NtpTimestamp, SntpError>,
        zone: &TimeZone,
    ) -> Result<i32, SntpError> {
        self.wall.synchronize(result, uptime_secs(), zone)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime {
        self.wall.local_at(uptime_secs())
    }

    fn is_synchronized(&self) -> bool {
        self.wall.is_synchronized()
    }
}
