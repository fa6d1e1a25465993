//! Firebase access: anonymous sign-up and Realtime Database REST calls
//!
//! The HTTP exchange itself is abstracted behind [`HttpTransport`] so the
//! same client runs over TLS on the device and against an in-process fake on
//! the desktop.

pub mod http;
pub mod json;
mod rtdb;
mod session;

use core::fmt::Debug;
use core::future::Future;

use thiserror_no_std::Error;

use crate::app_state::FromTruncated;

pub use http::{BodySink, HttpError, ResponseParser};
pub use json::ChildSummary;
pub use rtdb::{DatabaseUrl, RestDatabase, SIGN_UP_HOST};
pub use session::{Credentials, Session, SessionState, Transition};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("transport failed: {0}")]
    Transport(heapless::String<64>),
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("token rejected with status {0}")]
    Unauthorized(u16),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response body")]
    MalformedBody,
    #[error("no valid session")]
    NotAuthenticated,
    #[error("invalid database URL")]
    InvalidUrl,
}

impl CloudError {
    /// Wrap a transport error, keeping as much of its debug text as fits
    pub fn transport(error: impl Debug) -> Self {
        Self::Transport(heapless::String::from_truncated(format_args!("{:?}", error)))
    }
}

/// One HTTP request/response over a fresh connection to `host`.
///
/// Implementations write `request`, then feed every received byte to
/// `response` until it reports [`http::Progress::Done`] or the peer closes.
/// Framing errors stay inside the parser and are read back by the caller.
pub trait HttpTransport {
    type Error: Debug;

    /// Network link and IP configuration are up
    fn is_ready(&self) -> bool;

    fn exchange<S: BodySink>(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut ResponseParser<S>,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Remote store the reading pipeline writes to
pub trait Database {
    /// Authenticated and connected
    fn is_ready(&self) -> bool;

    /// Immediate children of `path`
    fn children(&mut self, path: &str) -> impl Future<Output = Result<ChildSummary, CloudError>>;

    fn delete(&mut self, path: &str) -> impl Future<Output = Result<(), CloudError>>;

    fn set_number(&mut self, path: &str, value: f32)
    -> impl Future<Output = Result<(), CloudError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_truncates() {
        let long = "x".repeat(100);
        match CloudError::transport(long) {
            CloudError::Transport(text) => {
                assert_eq!(text.len(), 64);
                assert!(text.starts_with("\"xxx"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
