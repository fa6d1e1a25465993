//! Desktop simulator for the SSPOT soil logger.
//!
//! Runs the same logging pipeline as the firmware against a virtual probe
//! and an in-memory Firebase, on simulated time, so the cycle, pruning and
//! session handling can be exercised without hardware or network.
//!
//! # Usage
//!
//! ```text
//! sspot-simulator [CONFIG.json] [--cycles N] [--capacity N] [--interval SECS] [--no-faults]
//! ```
//!
//! Set `RUST_LOG=debug` to see every request.

mod firebase;
mod probe;

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use log::{error, info};

use sspot_core::app_state::{AppRunState, AppState};
use sspot_core::cloud::{DatabaseUrl, RestDatabase, SessionState};
use sspot_core::config::Config;
use sspot_core::pipeline::Context;
use sspot_core::time::ntp::NtpTimestamp;
use sspot_core::time::{Clock, DateTime, TimeZone, WallClock};

use firebase::FakeFirebase;
use probe::VirtualProbe;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_CYCLES: u32 = 200;

/// Simulated seconds between cycles
const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Small enough that pruning kicks in during a default run
const DEFAULT_SIM_CAPACITY: usize = 100;

const SIM_DATABASE_URL: &str = "https://sspot-sim-default-rtdb.firebaseio.com/";
const SIM_API_KEY: &str = "sim-api-key";
const SIM_TOKEN_LIFETIME_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Simulated time
// ---------------------------------------------------------------------------

/// Wall clock over a shared, manually advanced uptime counter
struct SimClock {
    uptime: Rc<Cell<u64>>,
    wall: WallClock,
}

impl SimClock {
    fn new(uptime: Rc<Cell<u64>>) -> Self {
        Self {
            uptime,
            wall: WallClock::unsynchronized(),
        }
    }

    /// Anchor to the host's clock, as an NTP reply would
    fn synchronize(&mut self, zone: &TimeZone) -> bool {
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => now,
            Err(_) => return false,
        };
        let timestamp = NtpTimestamp {
            unix_secs: now.as_secs(),
            micros: now.subsec_micros(),
        };
        self.wall
            .synchronize(Ok(timestamp), self.uptime.get(), zone)
            .is_ok()
    }
}

impl Clock for SimClock {
    fn now(&self) -> DateTime {
        self.wall.local_at(self.uptime.get())
    }

    fn is_synchronized(&self) -> bool {
        self.wall.is_synchronized()
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

struct Args {
    config: Option<String>,
    cycles: u32,
    capacity: Option<usize>,
    interval_secs: u64,
    faults: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        cycles: DEFAULT_CYCLES,
        capacity: None,
        interval_secs: DEFAULT_INTERVAL_SECS,
        faults: true,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .ok_or_else(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--cycles" => {
                args.cycles = value("--cycles")?
                    .parse()
                    .map_err(|e| format!("--cycles: {}", e))?;
            }
            "--capacity" => {
                args.capacity = Some(
                    value("--capacity")?
                        .parse()
                        .map_err(|e| format!("--capacity: {}", e))?,
                );
            }
            "--interval" => {
                args.interval_secs = value("--interval")?
                    .parse()
                    .map_err(|e| format!("--interval: {}", e))?;
            }
            "--no-faults" => args.faults = false,
            other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
            path => args.config = Some(path.to_owned()),
        }
    }
    Ok(args)
}

fn simulator_config() -> Config<'static> {
    let mut config = Config::default();
    config.cloud.api_key = SIM_API_KEY;
    config.cloud.database_url = SIM_DATABASE_URL;
    config.storage.capacity = DEFAULT_SIM_CAPACITY;
    config
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

/// Run the requested cycles and return the number of records left stored
fn run(args: &Args, mut config: Config<'_>) -> Result<usize, String> {
    if let Some(capacity) = args.capacity {
        config.storage.capacity = capacity;
    }
    let url = DatabaseUrl::parse(config.cloud.database_url)
        .map_err(|e| format!("database_url: {}", e))?;

    let uptime = Rc::new(Cell::new(0u64));
    let mut app = AppState::new();

    app.set_run_state(AppRunState::WifiConnecting);
    app.set_run_state(AppRunState::WifiConnected);

    app.set_run_state(AppRunState::TimeSyncing);
    let mut clock = SimClock::new(uptime.clone());
    app.time_known = clock.synchronize(&config.time.zone);

    let fake = FakeFirebase::new(url.host(), uptime.clone(), SIM_TOKEN_LIFETIME_SECS);
    let db = RestDatabase::new(fake, url);
    let bus = VirtualProbe::new(0x5350_4F54, args.faults);
    let mut ctx = Context::new(bus, db, clock, config.pruner(), config.settings());

    let interval = args.interval_secs.max(1);
    let mut cycles = 0;
    while cycles < args.cycles {
        if let Some(transition) = ctx.db.poll_session(uptime.get()) {
            app.on_session(transition);
        }

        match ctx.db.session().state() {
            SessionState::Disabled => {
                app.set_run_state(AppRunState::Disabled);
                return Err(String::from("sign-up failed, logging disabled"));
            }
            SessionState::Unauthenticated => {
                app.set_run_state(AppRunState::Authenticating);
                let transition = block_on(ctx.db.sign_up(config.cloud.api_key, uptime.get()));
                app.on_session(transition);
                continue;
            }
            SessionState::Ready => app.set_run_state(AppRunState::Logging),
        }

        let _ = block_on(ctx.run_cycle());
        cycles += 1;
        uptime.set(uptime.get() + interval);
    }

    ctx.stats.report();
    let stored = ctx.db.transport().children(&ctx.settings.root).len();
    info!(
        "{} records stored under {} (capacity {})",
        stored,
        ctx.settings.root,
        ctx.pruner.threshold()
    );
    Ok(stored)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let text = match &args.config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let config = match &text {
        Some(text) => match serde_json::from_str::<Config<'_>>(text) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => simulator_config(),
    };

    info!("SSPOT simulator: {} cycles", args.cycles);
    if let Err(e) = run(&args, config) {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_run_stays_within_capacity() {
        let args = Args {
            config: None,
            cycles: 150,
            capacity: Some(20),
            interval_secs: 60,
            faults: true,
        };
        let stored = run(&args, simulator_config()).unwrap();
        assert!(stored > 0 && stored <= 20, "{} records", stored);
    }

    #[test]
    fn test_config_file_strings_are_borrowed() {
        let text = r#"{
            "cloud": { "api_key": "abc", "database_url": "https://x.firebaseio.com/" },
            "storage": { "capacity": 10 }
        }"#;
        let config: Config<'_> = serde_json::from_str(text).unwrap();
        assert_eq!(config.cloud.api_key, "abc");
        assert_eq!(config.storage.capacity, 10);
        assert!(config.sensor.verify_crc);
    }

    #[test]
    fn test_clock_follows_simulated_uptime() {
        let uptime = Rc::new(Cell::new(0));
        let mut clock = SimClock::new(uptime.clone());
        assert!(!clock.is_synchronized());
        assert!(clock.synchronize(&TimeZone::default()));

        let before = clock.now();
        uptime.set(3600);
        let after = clock.now();
        assert_ne!(before, after);
        assert!(clock.is_synchronized());
    }
}
