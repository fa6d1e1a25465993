//! One-shot SNTP query over UDP

use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use log::{debug, warn};

use sspot_core::time::ntp::{self, NTP_PACKET_LEN, NTP_PORT, NtpTimestamp, SntpError};

use super::resolve;

/// Any free port works; the reply is matched on the socket
const LOCAL_PORT: u16 = 50_123;

pub async fn query(
    stack: Stack<'_>,
    server: &str,
    timeout_ms: u64,
) -> Result<NtpTimestamp, SntpError> {
    let address = resolve(stack, server).await.map_err(|_| SntpError::Dns)?;
    let remote = IpEndpoint::new(address, NTP_PORT);

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(LOCAL_PORT).map_err(|e| {
        warn!("UDP bind failed: {:?}", e);
        SntpError::Network
    })?;

    debug!("SNTP request to {} ({})", server, remote);
    socket
        .send_to(&ntp::request_packet(), remote)
        .await
        .map_err(|e| {
            warn!("SNTP send failed: {:?}", e);
            SntpError::Network
        })?;

    let mut packet = [0u8; NTP_PACKET_LEN];
    let received = with_timeout(
        Duration::from_millis(timeout_ms),
        socket.recv_from(&mut packet),
    )
    .await;
    socket.close();

    let (len, _) = received
        .map_err(|_| SntpError::Timeout)?
        .map_err(|_| SntpError::Network)?;
    ntp::parse_response(&packet[..len])
}
