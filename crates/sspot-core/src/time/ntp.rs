//! SNTP packet encoding and decoding
//!
//! Only the client side of RFC 4330 is needed: one 48-byte request, one
//! 48-byte reply whose transmit timestamp becomes the wall-clock anchor.

use thiserror_no_std::Error;

/// NTP server port (UDP)
pub const NTP_PORT: u16 = 123;

/// Size of an NTP packet without extensions
pub const NTP_PACKET_LEN: usize = 48;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Seconds in one NTP era
const NTP_ERA_SECS: u64 = 1 << 32;

/// LI=0, VN=3, Mode=3 (client)
const CLIENT_HEADER: u8 = 0x1B;

const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;
const LEAP_ALARM: u8 = 3;
const MAX_STRATUM: u8 = 15;

/// SNTP client errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SntpError {
    #[error("network error")]
    Network,
    #[error("DNS lookup failed")]
    Dns,
    #[error("request timed out")]
    Timeout,
    #[error("malformed response")]
    InvalidResponse,
    #[error("server reports stratum {0}")]
    InvalidStratum(u8),
    #[error("server clock is not synchronized")]
    Unsynchronized,
}

/// Server transmit time converted to the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp {
    pub unix_secs: u64,
    pub micros: u32,
}

impl NtpTimestamp {
    /// Convert a raw 64-bit NTP timestamp.
    ///
    /// Values below the Unix offset are taken to be in era 1 (after 2036-02-07).
    pub fn from_ntp(secs: u32, fraction: u32) -> Self {
        let secs = secs as u64;
        let unix_secs = if secs >= NTP_UNIX_OFFSET {
            secs - NTP_UNIX_OFFSET
        } else {
            secs + NTP_ERA_SECS - NTP_UNIX_OFFSET
        };
        let micros = ((fraction as u64 * 1_000_000) >> 32) as u32;
        Self { unix_secs, micros }
    }
}

/// Build a client request packet
pub fn request_packet() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Validate a server reply and extract its transmit timestamp
pub fn parse_response(packet: &[u8]) -> Result<NtpTimestamp, SntpError> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(SntpError::InvalidResponse);
    }

    let leap = packet[0] >> 6;
    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER && mode != MODE_BROADCAST {
        return Err(SntpError::InvalidResponse);
    }
    if leap == LEAP_ALARM {
        return Err(SntpError::Unsynchronized);
    }

    let stratum = packet[1];
    if stratum == 0 || stratum > MAX_STRATUM {
        return Err(SntpError::InvalidStratum(stratum));
    }

    let secs = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if secs == 0 && fraction == 0 {
        return Err(SntpError::InvalidResponse);
    }

    Ok(NtpTimestamp::from_ntp(secs, fraction))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(stratum: u8, secs: u32, fraction: u32) -> [u8; NTP_PACKET_LEN] {
        let mut packet = [0u8; NTP_PACKET_LEN];
        packet[0] = 0x24; // LI=0, VN=4, Mode=4
        packet[1] = stratum;
        packet[40..44].copy_from_slice(&secs.to_be_bytes());
        packet[44..48].copy_from_slice(&fraction.to_be_bytes());
        packet
    }

    #[test]
    fn test_request_header() {
        let packet = request_packet();
        assert_eq!(packet[0], 0x1B);
        assert!(packet[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_valid_reply() {
        // 2024-01-01T00:00:00Z plus half a second
        let secs = (1_704_067_200u64 + NTP_UNIX_OFFSET) as u32;
        let ts = parse_response(&reply(2, secs, 0x8000_0000)).unwrap();
        assert_eq!(ts.unix_secs, 1_704_067_200);
        assert_eq!(ts.micros, 500_000);
    }

    #[test]
    fn test_era_one_rollover() {
        // NTP seconds wrap on 2036-02-07T06:28:16Z
        let ts = NtpTimestamp::from_ntp(10, 0);
        assert_eq!(ts.unix_secs, NTP_ERA_SECS - NTP_UNIX_OFFSET + 10);
    }

    #[test]
    fn test_rejects_short_packet() {
        assert_eq!(parse_response(&[0u8; 20]), Err(SntpError::InvalidResponse));
    }

    #[test]
    fn test_rejects_kiss_of_death() {
        let secs = (1_704_067_200u64 + NTP_UNIX_OFFSET) as u32;
        assert_eq!(
            parse_response(&reply(0, secs, 0)),
            Err(SntpError::InvalidStratum(0))
        );
    }

    #[test]
    fn test_rejects_client_mode_echo() {
        let mut packet = reply(2, 1, 0);
        packet[0] = CLIENT_HEADER;
        assert_eq!(parse_response(&packet), Err(SntpError::InvalidResponse));
    }

    #[test]
    fn test_rejects_unsynchronized_server() {
        let mut packet = reply(2, 1, 0);
        packet[0] = 0xE4; // LI=3
        assert_eq!(parse_response(&packet), Err(SntpError::Unsynchronized));
    }
}
