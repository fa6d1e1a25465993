//! Virtual soil probe answering on a simulated RS-485 bus

use sspot_core::modbus::{REQUEST_FRAME, REQUEST_LEN, RESPONSE_LEN, encode_response};
use sspot_core::sensors::{SensorBus, TransportError};

/// Every Nth transaction goes wrong in one of the ways a real bus does
const FAULT_PERIOD: u32 = 7;

/// Produces slowly drifting readings with periodic faults:
/// a silent bus, a corrupted checksum and an implausible temperature.
pub struct VirtualProbe {
    transactions: u32,
    state: u32,
    moisture: f32,
    faults: bool,
}

impl VirtualProbe {
    pub fn new(seed: u32, faults: bool) -> Self {
        Self {
            transactions: 0,
            state: seed.max(1),
            moisture: 35.0,
            faults,
        }
    }

    /// xorshift32
    fn next(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in [-1, 1)
    fn jitter(&mut self) -> f32 {
        (self.next() % 2000) as f32 / 1000.0 - 1.0
    }

    fn sample(&mut self) -> (u16, u16, u16) {
        self.moisture = (self.moisture + self.jitter() * 0.8).clamp(5.0, 95.0);
        let temperature = 18.0 + self.jitter() * 4.0;
        let conductivity = 250.0 + self.moisture * 4.0 + self.jitter() * 20.0;
        (
            (self.moisture * 10.0) as u16,
            (temperature * 10.0) as u16,
            conductivity as u16,
        )
    }
}

impl SensorBus for VirtualProbe {
    async fn transact(
        &mut self,
        request: &[u8; REQUEST_LEN],
    ) -> Result<[u8; RESPONSE_LEN], TransportError> {
        self.transactions += 1;
        if *request != REQUEST_FRAME {
            return Err(TransportError::Timeout);
        }

        let (moisture, temperature, conductivity) = self.sample();
        if !self.faults || self.transactions % FAULT_PERIOD != 0 {
            return Ok(encode_response(moisture, temperature, conductivity));
        }

        match (self.transactions / FAULT_PERIOD) % 3 {
            0 => Err(TransportError::IncompleteFrame { received: 11 }),
            1 => {
                let mut frame = encode_response(moisture, temperature, conductivity);
                frame[RESPONSE_LEN - 1] ^= 0x5A;
                Ok(frame)
            }
            _ => Ok(encode_response(moisture, 655, conductivity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use sspot_core::modbus::ResponseFrame;

    #[test]
    fn test_clean_probe_always_answers_with_valid_frames() {
        let mut probe = VirtualProbe::new(42, false);
        for _ in 0..50 {
            let raw = block_on(probe.transact(&REQUEST_FRAME)).unwrap();
            assert!(ResponseFrame::new(&raw).check(true).is_ok());
        }
    }

    #[test]
    fn test_faulty_probe_misbehaves_on_schedule() {
        let mut probe = VirtualProbe::new(42, true);
        let outcomes: Vec<_> = (0..FAULT_PERIOD * 3)
            .map(|_| block_on(probe.transact(&REQUEST_FRAME)))
            .collect();

        let faults: Vec<_> = outcomes
            .iter()
            .enumerate()
            .filter(|(i, _)| (*i as u32 + 1) % FAULT_PERIOD == 0)
            .map(|(_, outcome)| outcome)
            .collect();
        assert!(matches!(faults[0], Ok(raw) if ResponseFrame::new(raw).check(true).is_err()));
        assert!(matches!(faults[1], Ok(raw) if ResponseFrame::new(raw).register(1) == 655));
        assert_eq!(
            *faults[2],
            Err(TransportError::IncompleteFrame { received: 11 })
        );
    }

    #[test]
    fn test_unexpected_request_gets_no_answer() {
        let mut probe = VirtualProbe::new(1, false);
        let mut request = REQUEST_FRAME;
        request[0] = 0x02;
        assert_eq!(
            block_on(probe.transact(&request)),
            Err(TransportError::Timeout)
        );
    }
}
