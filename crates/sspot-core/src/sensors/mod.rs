//! Sensor transport seam and the soil reading model

mod soil;

pub use soil::*;

use thiserror_no_std::Error;

use crate::modbus::{REQUEST_LEN, RESPONSE_LEN};

/// Failure to obtain a complete response frame from the bus
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to transmit request")]
    Write,
    #[error("failed to read from the bus")]
    Read,
    #[error("no response before the read deadline")]
    Timeout,
    #[error("incomplete frame: {received} of 19 bytes")]
    IncompleteFrame { received: usize },
}

/// A half-duplex bus that can run one request/response transaction.
///
/// Implementations own the direction pin and must leave the transceiver in
/// receive state when the future completes, whatever the outcome.
pub trait SensorBus {
    /// Send `request` and wait for exactly one full response frame.
    fn transact(
        &mut self,
        request: &[u8; REQUEST_LEN],
    ) -> impl Future<Output = Result<[u8; RESPONSE_LEN], TransportError>>;
}
