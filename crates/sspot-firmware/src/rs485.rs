//! Half-duplex RS-485 link to the soil probe
//!
//! The transceiver's DE and /RE pins are tied together and driven by one
//! GPIO: high to transmit, low to receive.

use embassy_time::{Duration, Instant, Timer, with_deadline};
use embedded_hal::digital::OutputPin;
use esp_hal::Async;
use esp_hal::uart::{Config as UartConfig, DataBits, Parity, StopBits, Uart};
use log::{debug, warn};

use sspot_core::modbus::{FrameAssembler, REQUEST_LEN, RESPONSE_LEN, discard_pending};
use sspot_core::sensors::{SensorBus, TransportError};

pub const BAUD_RATE: u32 = 4800;

/// 4800 baud, 8N1
pub fn uart_config() -> UartConfig {
    UartConfig::default()
        .with_baudrate(BAUD_RATE)
        .with_data_bits(DataBits::_8)
        .with_parity(Parity::None)
        .with_stop_bits(StopBits::_1)
}

pub struct Rs485Bus<'d, P> {
    uart: Uart<'d, Async>,
    direction: P,
    settle: Duration,
    read_timeout: Duration,
}

impl<'d, P: OutputPin> Rs485Bus<'d, P> {
    pub fn new(uart: Uart<'d, Async>, mut direction: P, settle_ms: u64, read_timeout_ms: u64) -> Self {
        let _ = direction.set_low();
        Self {
            uart,
            direction,
            settle: Duration::from_millis(settle_ms),
            read_timeout: Duration::from_millis(read_timeout_ms),
        }
    }

    fn receive_mode(&mut self) {
        if self.direction.set_low().is_err() {
            warn!("Failed to release the RS-485 driver");
        }
    }

    /// A late reply or line noise left in the FIFO would shift every later
    /// frame by the same number of bytes.
    fn discard_stale(&mut self) {
        let uart = &mut self.uart;
        let drained = discard_pending(|buf| {
            if uart.read_ready() {
                uart.read_buffered(buf)
            } else {
                Ok(0)
            }
        });
        match drained {
            Ok(0) => {}
            Ok(n) => debug!("Dropped {} stale bytes before request", n),
            Err(e) => warn!("Failed to drain UART receive buffer: {:?}", e),
        }
    }

    async fn send(&mut self, request: &[u8]) -> Result<(), TransportError> {
        self.discard_stale();
        self.direction
            .set_high()
            .map_err(|_| TransportError::Write)?;

        let mut sent = 0;
        while sent < request.len() {
            let n = self
                .uart
                .write_async(&request[sent..])
                .await
                .map_err(|e| {
                    warn!("UART write failed: {:?}", e);
                    TransportError::Write
                })?;
            sent += n;
        }
        // The driver must stay enabled until the last stop bit is out
        self.uart.flush_async().await.map_err(|e| {
            warn!("UART flush failed: {:?}", e);
            TransportError::Write
        })
    }

    async fn receive(&mut self) -> Result<[u8; RESPONSE_LEN], TransportError> {
        let mut frame = FrameAssembler::new();
        let deadline = Instant::now() + self.read_timeout;

        while !frame.is_complete() {
            match with_deadline(deadline, self.uart.read_async(frame.remaining_mut())).await {
                Ok(Ok(n)) => frame.advance(n),
                Ok(Err(e)) => {
                    warn!("UART read failed: {:?}", e);
                    return Err(TransportError::Read);
                }
                Err(_) => break,
            }
        }

        debug!("Received {} of {} bytes", frame.received(), RESPONSE_LEN);
        frame.finish()
    }
}

impl<P: OutputPin> SensorBus for Rs485Bus<'_, P> {
    async fn transact(
        &mut self,
        request: &[u8; REQUEST_LEN],
    ) -> Result<[u8; RESPONSE_LEN], TransportError> {
        let sent = self.send(request).await;
        self.receive_mode();
        sent?;

        Timer::after(self.settle).await;
        self.receive().await
    }
}
