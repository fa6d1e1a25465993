//! Network clients on top of the embassy-net stack

mod https;
mod rng;
mod socket;
pub mod sntp;

pub use https::HttpsTransport;
pub use rng::HardwareRng;

use embassy_net::dns::DnsQueryType;
use embassy_net::{IpAddress, Stack};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    #[error("network is down")]
    NotConnected,
    #[error("DNS lookup failed")]
    Dns,
    #[error("TCP connect failed")]
    Connect,
    #[error("socket error")]
    Socket,
    #[error("TLS handshake failed")]
    TlsHandshake,
    #[error("TLS session error")]
    Tls,
    #[error("request timed out")]
    Timeout,
}

impl embedded_io_async::Error for NetError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        match self {
            Self::Socket | Self::Tls => embedded_io_async::ErrorKind::BrokenPipe,
            Self::Timeout => embedded_io_async::ErrorKind::TimedOut,
            Self::NotConnected | Self::Connect => embedded_io_async::ErrorKind::NotConnected,
            _ => embedded_io_async::ErrorKind::Other,
        }
    }
}

/// First IPv4 address for `host`
pub async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, NetError> {
    stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|e| {
            log::warn!("DNS query for {} failed: {:?}", host, e);
            NetError::Dns
        })?
        .first()
        .copied()
        .ok_or(NetError::Dns)
}
