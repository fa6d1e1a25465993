//! One logging cycle: poll the probe, check, validate, prune, upload
//!
//! ```text
//! transact -> frame check -> decode -> validate -> prune -> 3 x write
//! ```
//!
//! A cycle that fails before the prune step touches the database not at all.
//! After that point database failures are logged and counted but never abort
//! the cycle, and nothing is retried.

use alloc::string::String;

use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::cloud::Database;
use crate::metrics::CycleStats;
use crate::modbus::{FrameError, REQUEST_FRAME, ResponseFrame};
use crate::sensors::{PlausibilityBounds, RangeViolation, SensorBus, SoilReading, TransportError};
use crate::storage::{CapacityPruner, DEFAULT_ROOT, PruneOutcome, TimestampKey, field_path};
use crate::time::Clock;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CycleError {
    #[error("sensor transport: {0}")]
    Transport(#[from] TransportError),
    #[error("rejected frame: {0}")]
    Frame(#[from] FrameError),
    #[error("reading out of range: {0}")]
    OutOfRange(#[from] RangeViolation),
}

/// What an accepted reading led to
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub key: TimestampKey,
    pub reading: SoilReading,
    /// `None` when the capacity check itself failed
    pub prune: Option<PruneOutcome>,
    pub written: u8,
    pub failed: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root: String,
    pub bounds: PlausibilityBounds,
    pub verify_crc: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: String::from(DEFAULT_ROOT),
            bounds: PlausibilityBounds::default(),
            verify_crc: true,
        }
    }
}

/// Everything a cycle needs, owned by the main loop
pub struct Context<B, D, C> {
    pub bus: B,
    pub db: D,
    pub clock: C,
    pub pruner: CapacityPruner,
    pub settings: Settings,
    pub stats: CycleStats,
}

impl<B, D, C> Context<B, D, C>
where
    B: SensorBus,
    D: Database,
    C: Clock,
{
    pub fn new(bus: B, db: D, clock: C, pruner: CapacityPruner, settings: Settings) -> Self {
        Self {
            bus,
            db,
            clock,
            pruner,
            settings,
            stats: CycleStats::new(),
        }
    }

    /// Database and session are usable
    pub fn is_ready(&self) -> bool {
        self.db.is_ready()
    }

    /// Run one cycle and fold its outcome into the statistics.
    pub async fn run_cycle(&mut self) -> Result<UploadReport, CycleError> {
        let outcome = self.cycle().await;
        self.stats.record(&outcome);
        self.stats.report_if_due();
        outcome
    }

    async fn cycle(&mut self) -> Result<UploadReport, CycleError> {
        let raw = self.bus.transact(&REQUEST_FRAME).await.inspect_err(|e| {
            warn!("Sensor read failed: {}", e);
        })?;

        let frame = ResponseFrame::new(&raw);
        frame.check(self.settings.verify_crc).inspect_err(|e| {
            warn!("Discarding response: {}", e);
        })?;

        let reading = SoilReading::decode(&frame);
        self.settings.bounds.validate(&reading).inspect_err(|e| {
            warn!("Discarding reading {:?}: {}", reading, e);
        })?;

        let prune = match self.pruner.run(&mut self.db, &self.settings.root).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Capacity check failed, writing anyway: {}", e);
                None
            }
        };

        if !self.clock.is_synchronized() {
            warn!("Clock never synchronised, timestamp is relative to boot");
        }
        let key = TimestampKey::from_datetime(&self.clock.now());

        let (mut written, mut failed) = (0u8, 0u8);
        for (field, value) in reading.fields() {
            let path = field_path(&self.settings.root, &key, field);
            match self.db.set_number(&path, value).await {
                Ok(()) => written += 1,
                Err(e) => {
                    error!("Write to {} failed: {}", path, e);
                    failed += 1;
                }
            }
        }

        info!(
            "{}: moisture {:.1}%, temperature {:.1}C, conductivity {:.0}uS/cm ({} of 3 written)",
            key, reading.moisture, reading.temperature, reading.conductivity, written
        );

        Ok(UploadReport {
            key,
            reading,
            prune,
            written,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::encode_response;
    use crate::sensors::Field;
    use crate::testing::{Call, FixedClock, MemoryDatabase, ScriptedBus};
    use embassy_futures::block_on;

    // 2024-05-01T10:00:00Z
    const NOW: i64 = 1_714_557_600;

    fn context(
        responses: &[Result<[u8; 19], TransportError>],
        db: MemoryDatabase,
    ) -> Context<ScriptedBus, MemoryDatabase, FixedClock> {
        Context::new(
            ScriptedBus::new(responses),
            db,
            FixedClock::at(NOW),
            CapacityPruner::default(),
            Settings::default(),
        )
    }

    #[test]
    fn test_valid_reading_is_uploaded() {
        let mut ctx = context(&[Ok(encode_response(0x0190, 0x0096, 0x0032))], MemoryDatabase::new());
        let report = block_on(ctx.run_cycle()).unwrap();

        assert_eq!(report.key.as_str(), "2024-05-01T10:00:00");
        assert_eq!((report.written, report.failed), (3, 0));
        assert_eq!(report.prune, Some(PruneOutcome::BelowThreshold { count: 0 }));

        let db = &ctx.db;
        assert_eq!(db.value("/SSPOTV1/2024-05-01T10:00:00/Moisture"), Some(40.0));
        assert_eq!(db.value("/SSPOTV1/2024-05-01T10:00:00/Temperature"), Some(15.0));
        assert_eq!(db.value("/SSPOTV1/2024-05-01T10:00:00/Conductivity"), Some(50.0));
        assert_eq!(db.record_keys("/SSPOTV1").len(), 1);
        assert_eq!(ctx.stats.uploaded, 1);
    }

    #[test]
    fn test_wrong_function_code_touches_nothing() {
        let mut raw = encode_response(0x0190, 0x0096, 0x0032);
        raw[1] = 0x02;
        let mut ctx = context(&[Ok(raw)], MemoryDatabase::new());

        let result = block_on(ctx.run_cycle());
        assert_eq!(
            result,
            Err(CycleError::Frame(FrameError::FunctionMismatch {
                expected: 0x03,
                found: 0x02
            }))
        );
        assert!(ctx.db.calls.is_empty());
        assert_eq!(ctx.stats.rejected_frames, 1);
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut raw = encode_response(0x0190, 0x0096, 0x0032);
        raw[4] ^= 0x01;
        let mut ctx = context(&[Ok(raw)], MemoryDatabase::new());
        assert!(matches!(
            block_on(ctx.run_cycle()),
            Err(CycleError::Frame(FrameError::ChecksumMismatch { .. }))
        ));
        assert!(ctx.db.calls.is_empty());

        // Same frame passes with verification off
        ctx.settings.verify_crc = false;
        ctx.bus.responses.push_back(Ok(raw));
        assert!(block_on(ctx.run_cycle()).is_ok());
    }

    #[test]
    fn test_out_of_range_conductivity_is_dropped() {
        let mut ctx = context(&[Ok(encode_response(0x0190, 0x0096, 1500))], MemoryDatabase::new());
        let result = block_on(ctx.run_cycle());
        assert_eq!(
            result,
            Err(CycleError::OutOfRange(RangeViolation {
                field: Field::Conductivity,
                value: 1500.0,
                limit: 1000.0
            }))
        );
        assert!(ctx.db.calls.is_empty());
    }

    #[test]
    fn test_out_of_range_temperature_is_dropped() {
        // 60.1 C
        let mut ctx = context(&[Ok(encode_response(0x0190, 601, 50))], MemoryDatabase::new());
        assert!(matches!(
            block_on(ctx.run_cycle()),
            Err(CycleError::OutOfRange(RangeViolation {
                field: Field::Temperature,
                ..
            }))
        ));
        assert_eq!(ctx.db.writes(), 0);
    }

    #[test]
    fn test_transport_failure() {
        let mut ctx = context(
            &[Err(TransportError::IncompleteFrame { received: 7 })],
            MemoryDatabase::new(),
        );
        assert_eq!(
            block_on(ctx.run_cycle()),
            Err(CycleError::Transport(TransportError::IncompleteFrame { received: 7 }))
        );
        assert!(ctx.db.calls.is_empty());
        assert_eq!(ctx.bus.requests, 1);
    }

    #[test]
    fn test_full_root_prunes_exactly_one_before_writing() {
        let keys: alloc::vec::Vec<String> = (0..5000).map(|i| alloc::format!("k{:05}", i)).collect();
        let refs: alloc::vec::Vec<&str> = keys.iter().map(String::as_str).collect();
        let db = MemoryDatabase::with_records("/SSPOTV1", &refs);

        let mut ctx = context(&[Ok(encode_response(0x0190, 0x0096, 0x0032))], db);
        let report = block_on(ctx.run_cycle()).unwrap();

        assert_eq!(
            report.prune,
            Some(PruneOutcome::Pruned {
                key: String::from("k00000"),
                count: 5000
            })
        );
        let deletes: alloc::vec::Vec<&Call> = ctx
            .db
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .collect();
        assert_eq!(deletes, [&Call::Delete(String::from("/SSPOTV1/k00000"))]);
        // The delete comes before any write
        assert!(matches!(ctx.db.calls[1], Call::Delete(_)));
        assert_eq!(ctx.db.record_keys("/SSPOTV1").len(), 5000);
    }

    #[test]
    fn test_below_capacity_never_deletes() {
        let db = MemoryDatabase::with_records("/SSPOTV1", &["a", "b", "c"]);
        let mut ctx = context(&[Ok(encode_response(100, 100, 100))], db);
        block_on(ctx.run_cycle()).unwrap();
        assert!(!ctx.db.calls.iter().any(|c| matches!(c, Call::Delete(_))));
    }

    #[test]
    fn test_failed_listing_still_writes() {
        let mut db = MemoryDatabase::new();
        db.fail_children = true;
        let mut ctx = context(&[Ok(encode_response(100, 100, 100))], db);

        let report = block_on(ctx.run_cycle()).unwrap();
        assert_eq!(report.prune, None);
        assert_eq!(report.written, 3);
    }

    #[test]
    fn test_partial_write_failure_is_not_rolled_back() {
        let mut db = MemoryDatabase::new();
        db.fail_field = Some("Temperature");
        let mut ctx = context(&[Ok(encode_response(100, 100, 100))], db);

        let report = block_on(ctx.run_cycle()).unwrap();
        assert_eq!((report.written, report.failed), (2, 1));
        assert_eq!(ctx.db.writes(), 3);
        assert_eq!(ctx.db.value("/SSPOTV1/2024-05-01T10:00:00/Moisture"), Some(10.0));
        assert_eq!(ctx.stats.failed_writes, 1);
    }

    #[test]
    fn test_unsynchronized_clock_uses_epoch_keys() {
        let mut ctx = context(&[Ok(encode_response(100, 100, 100))], MemoryDatabase::new());
        ctx.clock = FixedClock {
            now: crate::time::DateTime::from_epoch_secs(42),
            synchronized: false,
        };
        let report = block_on(ctx.run_cycle()).unwrap();
        assert_eq!(report.key.as_str(), "1970-01-01T00:00:42");
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let raw = encode_response(0x0190, 0x0096, 0x0032);
        let mut ctx = context(&[Ok(raw), Ok(raw)], MemoryDatabase::new());
        let first = block_on(ctx.run_cycle()).unwrap();
        let second = block_on(ctx.run_cycle()).unwrap();
        assert_eq!(first.reading, second.reading);
    }
}
