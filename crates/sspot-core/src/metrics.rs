//! Running counters over logging cycles
//!
//! Kept in RAM only; they reset on every boot and are reported through the
//! log every [`CycleStats::REPORT_EVERY`] cycles.

use log::info;

use crate::pipeline::{CycleError, UploadReport};
use crate::storage::PruneOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Cycles run, whatever their outcome
    pub cycles: u32,
    /// Readings with at least one field stored
    pub uploaded: u32,
    pub transport_errors: u32,
    /// Wrong function code or bad checksum
    pub rejected_frames: u32,
    pub out_of_range: u32,
    pub pruned: u32,
    /// Field writes that failed
    pub failed_writes: u32,
}

impl CycleStats {
    pub const REPORT_EVERY: u32 = 60;

    pub const fn new() -> Self {
        Self {
            cycles: 0,
            uploaded: 0,
            transport_errors: 0,
            rejected_frames: 0,
            out_of_range: 0,
            pruned: 0,
            failed_writes: 0,
        }
    }

    pub fn record(&mut self, outcome: &Result<UploadReport, CycleError>) {
        self.cycles = self.cycles.wrapping_add(1);
        match outcome {
            Ok(report) => {
                if report.written > 0 {
                    self.uploaded += 1;
                }
                self.failed_writes += report.failed as u32;
                if matches!(report.prune, Some(PruneOutcome::Pruned { .. })) {
                    self.pruned += 1;
                }
            }
            Err(CycleError::Transport(_)) => self.transport_errors += 1,
            Err(CycleError::Frame(_)) => self.rejected_frames += 1,
            Err(CycleError::OutOfRange(_)) => self.out_of_range += 1,
        }
    }

    /// Share of cycles that stored at least one field, in percent
    pub fn success_rate(&self) -> f32 {
        if self.cycles == 0 {
            return 0.0;
        }
        self.uploaded as f32 * 100.0 / self.cycles as f32
    }

    /// Log a summary every [`Self::REPORT_EVERY`] cycles; returns whether it did
    pub fn report_if_due(&self) -> bool {
        if self.cycles == 0 || self.cycles % Self::REPORT_EVERY != 0 {
            return false;
        }
        self.report();
        true
    }

    pub fn report(&self) {
        info!(
            "Cycles: {} ({:.1}% uploaded), transport errors: {}, rejected frames: {}, out of range: {}, pruned: {}, failed writes: {}",
            self.cycles,
            self.success_rate(),
            self.transport_errors,
            self.rejected_frames,
            self.out_of_range,
            self.pruned,
            self.failed_writes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::FrameError;
    use crate::sensors::{Field, RangeViolation, SoilReading, TransportError};
    use crate::storage::TimestampKey;
    use crate::time::DateTime;
    use alloc::string::String;

    fn report(failed: u8, pruned: bool) -> UploadReport {
        UploadReport {
            key: TimestampKey::from_datetime(&DateTime::from_epoch_secs(0)),
            reading: SoilReading {
                moisture: 40.0,
                temperature: 15.0,
                conductivity: 50.0,
            },
            prune: pruned.then(|| PruneOutcome::Pruned {
                key: String::from("old"),
                count: 5000,
            }),
            written: 3 - failed,
            failed,
        }
    }

    #[test]
    fn test_counts_each_outcome() {
        let mut stats = CycleStats::new();
        stats.record(&Ok(report(0, false)));
        stats.record(&Ok(report(1, true)));
        stats.record(&Err(CycleError::Transport(TransportError::Timeout)));
        stats.record(&Err(CycleError::Frame(FrameError::FunctionMismatch {
            expected: 3,
            found: 2,
        })));
        stats.record(&Err(CycleError::OutOfRange(RangeViolation {
            field: Field::Conductivity,
            value: 1500.0,
            limit: 1000.0,
        })));

        assert_eq!(
            stats,
            CycleStats {
                cycles: 5,
                uploaded: 2,
                transport_errors: 1,
                rejected_frames: 1,
                out_of_range: 1,
                pruned: 1,
                failed_writes: 1,
            }
        );
        assert!((stats.success_rate() - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_all_writes_failed_is_not_uploaded() {
        let mut stats = CycleStats::new();
        stats.record(&Ok(report(3, false)));
        stats.record(&Ok(report(2, false)));

        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.failed_writes, 5);
        assert!((stats.success_rate() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_report_cadence() {
        let mut stats = CycleStats::new();
        assert!(!stats.report_if_due());
        for _ in 0..CycleStats::REPORT_EVERY {
            stats.record(&Err(CycleError::Transport(TransportError::Timeout)));
        }
        assert!(stats.report_if_due());
        stats.record(&Err(CycleError::Transport(TransportError::Timeout)));
        assert!(!stats.report_if_due());
    }
}
