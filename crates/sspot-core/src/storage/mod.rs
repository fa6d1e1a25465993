//! Layout of the stored records
//!
//! Every accepted reading becomes one node under the root path, keyed by the
//! local time of the upload:
//!
//! ```text
//! /SSPOTV1
//!   /2024-05-01T10:00:00
//!     Moisture: 40.0
//!     Temperature: 15.0
//!     Conductivity: 50.0
//! ```

pub mod pruner;

pub use pruner::*;

use alloc::format;
use alloc::string::String;
use core::fmt::{self, Write};

use crate::sensors::Field;
use crate::time::DateTime;

/// Root node holding all records
pub const DEFAULT_ROOT: &str = "/SSPOTV1";

/// Record count at which pruning starts
pub const DEFAULT_CAPACITY: usize = 5000;

/// `YYYY-MM-DDTHH:MM:SS`, one-second resolution.
///
/// Keys sort lexicographically in time order. Two uploads within the same
/// second share a key and the later one overwrites the earlier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampKey(heapless::String<24>);

impl TimestampKey {
    pub fn from_datetime(dt: &DateTime) -> Self {
        let mut key = heapless::String::new();
        let _ = write!(
            key,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
        );
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<root>/<key>`
pub fn record_path(root: &str, key: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), key)
}

/// `<root>/<key>/<field>`
pub fn field_path(root: &str, key: &TimestampKey, field: Field) -> String {
    format!("{}/{}/{}", root.trim_end_matches('/'), key, field.key())
}
