//! Build-time configuration, see `build.rs` and `.env.example`

use sspot_core::app_state::{AppError, FromTruncated};
use sspot_core::cloud::DatabaseUrl;
use sspot_core::config::{CloudConfig, Config, InternetConfig, SensorConfig, StorageConfig};
use sspot_core::storage::EvictionOrder;

const WIFI_SSID: &str = env!("WIFI_SSID");
const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");
const WEB_API_KEY: &str = env!("WEB_API_KEY");
const DATABASE_URL: &str = env!("DATABASE_URL");

const SAMPLE_INTERVAL_SECS: Option<&str> = option_env!("SAMPLE_INTERVAL_SECS");
const EVICTION_ORDER: Option<&str> = option_env!("EVICTION_ORDER");
const VERIFY_CRC: Option<&str> = option_env!("VERIFY_CRC");

/// Assemble the device configuration, rejecting missing credentials and a
/// database URL without a usable host
pub fn load() -> Result<(Config<'static>, DatabaseUrl), AppError> {
    for (name, value) in [
        ("WIFI_SSID", WIFI_SSID),
        ("WEB_API_KEY", WEB_API_KEY),
        ("DATABASE_URL", DATABASE_URL),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Config(heapless::String::from_truncated(
                format_args!("{} is empty", name),
            )));
        }
    }

    let database_url = DatabaseUrl::parse(DATABASE_URL).map_err(|e| {
        AppError::Config(heapless::String::from_truncated(format_args!(
            "DATABASE_URL: {}",
            e
        )))
    })?;

    let mut sensor = SensorConfig::default();
    if let Some(secs) = SAMPLE_INTERVAL_SECS {
        sensor.sample_interval_secs = secs.trim().parse().map_err(|_| {
            AppError::Config(heapless::String::from_truncated("SAMPLE_INTERVAL_SECS"))
        })?;
    }
    if let Some(flag) = VERIFY_CRC {
        sensor.verify_crc = !matches!(flag.trim(), "0" | "false" | "no" | "off");
    }

    let mut storage = StorageConfig::default();
    if let Some(name) = EVICTION_ORDER {
        storage.eviction = EvictionOrder::from_name(name).ok_or_else(|| {
            AppError::Config(heapless::String::from_truncated("EVICTION_ORDER"))
        })?;
    }

    let config = Config {
        internet: InternetConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        cloud: CloudConfig {
            api_key: WEB_API_KEY,
            database_url: DATABASE_URL,
        },
        sensor,
        storage,
        ..Config::default()
    };
    Ok((config, database_url))
}
