//! Device configuration
//!
//! Strings are borrowed so the firmware can build a `Config` straight from
//! compile-time constants while the simulator deserialises one from a file.

use serde::{Deserialize, Serialize};

use crate::pipeline::Settings;
use crate::sensors::PlausibilityBounds;
use crate::storage::{CapacityPruner, DEFAULT_CAPACITY, DEFAULT_ROOT, EvictionOrder};
use crate::time::TimeZone;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub cloud: CloudConfig<'a>,
    pub time: TimeConfig<'a>,
    pub sensor: SensorConfig,
    pub storage: StorageConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CloudConfig<'a> {
    /// Firebase Web API key
    pub api_key: &'a str,
    /// `https://<project>.firebaseio.com/` or the regional equivalent
    pub database_url: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimeConfig<'a> {
    pub ntp_server: &'a str,
    pub zone: TimeZone,
    /// How long to wait for the NTP reply
    pub timeout_ms: u64,
}

impl Default for TimeConfig<'_> {
    fn default() -> Self {
        Self {
            ntp_server: "pool.ntp.org",
            zone: TimeZone::default(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub bounds: PlausibilityBounds,
    pub verify_crc: bool,
    /// Pause between switching the transceiver to receive and reading
    pub settle_ms: u64,
    /// Upper bound on waiting for the complete response
    pub read_timeout_ms: u64,
    /// Extra delay between cycles
    pub sample_interval_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bounds: PlausibilityBounds::default(),
            verify_crc: true,
            settle_ms: 1000,
            read_timeout_ms: 500,
            sample_interval_secs: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig<'a> {
    pub root: &'a str,
    pub capacity: usize,
    pub eviction: EvictionOrder,
}

impl Default for StorageConfig<'_> {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT,
            capacity: DEFAULT_CAPACITY,
            eviction: EvictionOrder::default(),
        }
    }
}

impl Config<'_> {
    /// Pipeline settings derived from the sensor and storage sections
    pub fn settings(&self) -> Settings {
        Settings {
            root: self.storage.root.into(),
            bounds: self.sensor.bounds,
            verify_crc: self.sensor.verify_crc,
        }
    }

    pub fn pruner(&self) -> CapacityPruner {
        CapacityPruner::new(self.storage.capacity, self.storage.eviction)
    }
}
