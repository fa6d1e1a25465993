//! Modbus RTU framing for the soil probe
//!
//! The probe is queried with a single constant "read holding registers"
//! request and answers with a fixed 19-byte frame:
//!
//! | Offset | Size | Content                          |
//! |--------|------|----------------------------------|
//! | 0      | 1    | Slave address                    |
//! | 1      | 1    | Function code (0x03)             |
//! | 2      | 1    | Byte count (14)                  |
//! | 3      | 14   | Seven big-endian 16-bit registers|
//! | 17     | 2    | CRC-16/MODBUS, little-endian     |

use thiserror_no_std::Error;

use crate::sensors::TransportError;

/// Slave address of the soil probe
pub const SLAVE_ADDRESS: u8 = 0x01;

/// Function code for "read holding registers"
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// Number of registers requested from the probe
pub const REGISTER_COUNT: u16 = 7;

/// Length of the request frame in bytes
pub const REQUEST_LEN: usize = 8;

/// Length of the expected response frame in bytes
pub const RESPONSE_LEN: usize = 3 + (REGISTER_COUNT as usize) * 2 + 2;

/// Offset of the first register in a response frame
const DATA_OFFSET: usize = 3;

/// The one request this firmware ever sends: slave 1, read 7 registers from 0.
pub const REQUEST_FRAME: [u8; REQUEST_LEN] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x07, 0x04, 0x08];

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF)
pub const fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    let mut i = 0;
    while i < data.len() {
        crc ^= data[i] as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
            bit += 1;
        }
        i += 1;
    }
    crc
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("unexpected function code 0x{found:02X} (expected 0x{expected:02X})")]
    FunctionMismatch { expected: u8, found: u8 },
    #[error("checksum mismatch: frame carries 0x{found:04X}, computed 0x{expected:04X}")]
    ChecksumMismatch { expected: u16, found: u16 },
}

/// Borrowed view over a complete response frame
#[derive(Debug, Clone, Copy)]
pub struct ResponseFrame<'a> {
    bytes: &'a [u8; RESPONSE_LEN],
}

impl<'a> ResponseFrame<'a> {
    pub const fn new(bytes: &'a [u8; RESPONSE_LEN]) -> Self {
        Self { bytes }
    }

    pub const fn function_code(&self) -> u8 {
        self.bytes[1]
    }

    /// Register `index` (0-based) as a big-endian u16
    pub fn register(&self, index: usize) -> u16 {
        let offset = DATA_OFFSET + index * 2;
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// CRC carried in the last two bytes of the frame
    pub fn carried_crc(&self) -> u16 {
        u16::from_le_bytes([self.bytes[RESPONSE_LEN - 2], self.bytes[RESPONSE_LEN - 1]])
    }

    pub fn computed_crc(&self) -> u16 {
        crc16(&self.bytes[..RESPONSE_LEN - 2])
    }

    /// Check the function code and, when `verify_crc` is set, the checksum.
    ///
    /// The function code is always checked first so a foreign frame is reported
    /// as such even when its checksum happens to be wrong too.
    pub fn check(&self, verify_crc: bool) -> Result<(), FrameError> {
        if self.function_code() != READ_HOLDING_REGISTERS {
            return Err(FrameError::FunctionMismatch {
                expected: READ_HOLDING_REGISTERS,
                found: self.function_code(),
            });
        }

        if verify_crc {
            let expected = self.computed_crc();
            let found = self.carried_crc();
            if expected != found {
                return Err(FrameError::ChecksumMismatch { expected, found });
            }
        }

        Ok(())
    }
}

/// Collects response bytes as they trickle in from the UART.
///
/// The serial driver reads directly into [`FrameAssembler::remaining_mut`]
/// and reports how many bytes landed with [`FrameAssembler::advance`].
#[derive(Debug)]
pub struct FrameAssembler {
    buf: [u8; RESPONSE_LEN],
    len: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub const fn new() -> Self {
        Self {
            buf: [0; RESPONSE_LEN],
            len: 0,
        }
    }

    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    pub fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(RESPONSE_LEN);
    }

    /// Copy as much of `bytes` as fits, returning the number consumed.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let room = self.remaining_mut();
        let n = bytes.len().min(room.len());
        room[..n].copy_from_slice(&bytes[..n]);
        self.advance(n);
        n
    }

    pub const fn received(&self) -> usize {
        self.len
    }

    pub const fn is_complete(&self) -> bool {
        self.len == RESPONSE_LEN
    }

    /// Hand out the frame, or the reason there isn't one.
    pub fn finish(self) -> Result<[u8; RESPONSE_LEN], TransportError> {
        match self.len {
            RESPONSE_LEN => Ok(self.buf),
            0 => Err(TransportError::Timeout),
            received => Err(TransportError::IncompleteFrame { received }),
        }
    }
}

/// Most bytes thrown away before one request. A line that keeps producing
/// data past this is left to the frame check.
pub const MAX_DISCARD: usize = 4 * RESPONSE_LEN;

/// Drop whatever is already waiting on the bus so the next response lands at
/// offset 0 of the frame.
///
/// `read` must not block and returns 0 once nothing is pending. Returns the
/// number of bytes dropped.
pub fn discard_pending<E>(
    mut read: impl FnMut(&mut [u8]) -> Result<usize, E>,
) -> Result<usize, E> {
    let mut scratch = [0u8; RESPONSE_LEN];
    let mut dropped = 0;
    while dropped < MAX_DISCARD {
        let n = read(&mut scratch)?;
        if n == 0 {
            break;
        }
        dropped += n;
    }
    Ok(dropped)
}

/// Build a well-formed response frame around three register values.
///
/// Used by the simulator's virtual probe and by tests; the remaining four
/// registers (pH, N, P, K on the real probe) are zero.
pub fn encode_response(moisture: u16, temperature: u16, conductivity: u16) -> [u8; RESPONSE_LEN] {
    let mut frame = [0u8; RESPONSE_LEN];
    frame[0] = SLAVE_ADDRESS;
    frame[1] = READ_HOLDING_REGISTERS;
    frame[2] = (REGISTER_COUNT * 2) as u8;
    frame[3..5].copy_from_slice(&moisture.to_be_bytes());
    frame[5..7].copy_from_slice(&temperature.to_be_bytes());
    frame[7..9].copy_from_slice(&conductivity.to_be_bytes());
    let crc = crc16(&frame[..RESPONSE_LEN - 2]);
    frame[RESPONSE_LEN - 2..].copy_from_slice(&crc.to_le_bytes());
    frame
}
