//! HTTPS client transport: one TLS 1.3 connection per request

use alloc::vec;

use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::{Read, Write};
use embedded_tls::{
    Aes128GcmSha256, CryptoProvider, NoVerify, TlsConfig, TlsConnection, TlsContext, TlsVerifier,
};
use log::{debug, warn};

use sspot_core::cloud::http::Progress;
use sspot_core::cloud::{BodySink, HttpTransport, ResponseParser};

use super::socket::AsyncTcpSocket;
use super::{HardwareRng, NetError, resolve};

const HTTPS_PORT: u16 = 443;

/// A full TLS record plus header and tag
const TLS_READ_BUFFER: usize = 16_640;
const TLS_WRITE_BUFFER: usize = 4096;
const TCP_BUFFER: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Server certificates are not verified; traffic is encrypted only
struct Provider<'a> {
    rng: &'a mut HardwareRng,
    verifier: NoVerify,
}

impl CryptoProvider for Provider<'_> {
    type CipherSuite = Aes128GcmSha256;
    type Signature = &'static [u8];

    fn rng(&mut self) -> impl rand_core::CryptoRngCore {
        &mut *self.rng
    }

    fn verifier(
        &mut self,
    ) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, embedded_tls::TlsError> {
        Ok(&mut self.verifier)
    }
}

pub struct HttpsTransport {
    stack: Stack<'static>,
    rng: HardwareRng,
}

impl HttpsTransport {
    pub fn new(stack: Stack<'static>, rng: HardwareRng) -> Self {
        Self { stack, rng }
    }

    async fn run<S: BodySink>(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut ResponseParser<S>,
    ) -> Result<(), NetError> {
        let address = resolve(self.stack, host).await?;
        let endpoint = IpEndpoint::new(address, HTTPS_PORT);
        debug!("Connecting to {} ({})", host, endpoint);

        let mut rx_buffer = vec![0u8; TCP_BUFFER];
        let mut tx_buffer = vec![0u8; TCP_BUFFER];
        let mut socket = AsyncTcpSocket::new(self.stack, &mut rx_buffer, &mut tx_buffer);
        socket.connect(endpoint).await?;

        let mut read_record = vec![0u8; TLS_READ_BUFFER];
        let mut write_record = vec![0u8; TLS_WRITE_BUFFER];
        let config = TlsConfig::new().with_server_name(host);
        let mut tls: TlsConnection<'_, AsyncTcpSocket<'_>, Aes128GcmSha256> =
            TlsConnection::new(socket, &mut read_record, &mut write_record);

        let provider = Provider {
            rng: &mut self.rng,
            verifier: NoVerify,
        };
        tls.open(TlsContext::new(&config, provider))
            .await
            .map_err(|e| {
                warn!("TLS handshake with {} failed: {:?}", host, e);
                NetError::TlsHandshake
            })?;

        tls.write_all(request).await.map_err(|e| {
            warn!("TLS write failed: {:?}", e);
            NetError::Tls
        })?;
        tls.flush().await.map_err(|_| NetError::Tls)?;

        let mut chunk = [0u8; 512];
        loop {
            match tls.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if response.feed(&chunk[..n]) == Progress::Done {
                        break;
                    }
                }
                // Servers often drop the connection without close_notify once
                // the body is out; the parser decides whether that was early.
                Err(e) if response.status().is_some() => {
                    debug!("Connection ended: {:?}", e);
                    break;
                }
                Err(e) => {
                    warn!("TLS read failed: {:?}", e);
                    return Err(NetError::Tls);
                }
            }
        }

        if let Err((mut socket, e)) = tls.close().await {
            debug!("TLS close: {:?}", e);
            socket.close();
        }
        Ok(())
    }
}

impl HttpTransport for HttpsTransport {
    type Error = NetError;

    fn is_ready(&self) -> bool {
        self.stack.is_link_up() && self.stack.is_config_up()
    }

    async fn exchange<S: BodySink>(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut ResponseParser<S>,
    ) -> Result<(), Self::Error> {
        if !self.is_ready() {
            return Err(NetError::NotConnected);
        }
        with_timeout(REQUEST_TIMEOUT, self.run(host, request, response))
            .await
            .map_err(|_| NetError::Timeout)?
    }
}
