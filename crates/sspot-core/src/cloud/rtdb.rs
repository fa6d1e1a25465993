//! Firebase Realtime Database over its REST interface

use alloc::format;
use alloc::string::String;

use log::{debug, error, warn};

use super::http::{Collect, Discard, Method, render_request};
use super::json::{self, ChildSummary, ShallowKeyScanner};
use super::session::{Credentials, Session, Transition};
use super::{BodySink, CloudError, Database, HttpTransport, ResponseParser};

/// Identity Toolkit endpoint for anonymous accounts
pub const SIGN_UP_HOST: &str = "identitytoolkit.googleapis.com";

const SIGN_UP_BODY: &str = r#"{"returnSecureToken":true}"#;

/// The sign-up reply carries a JWT plus a refresh token; this is plenty
const SIGN_UP_BODY_LIMIT: usize = 8 * 1024;

/// Used when the reply omits `expiresIn`
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Host part of the configured database URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseUrl {
    host: String,
}

impl DatabaseUrl {
    /// Accepts `https://<host>/`, `<host>` and anything in between.
    pub fn parse(url: &str) -> Result<Self, CloudError> {
        let url = url.trim();
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '?') {
            return Err(CloudError::InvalidUrl);
        }
        Ok(Self {
            host: String::from(host),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Database client holding the anonymous session
pub struct RestDatabase<T> {
    transport: T,
    host: String,
    session: Session,
}

impl<T: HttpTransport> RestDatabase<T> {
    pub fn new(transport: T, url: DatabaseUrl) -> Self {
        Self {
            transport,
            host: url.host,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Create a fresh anonymous account and keep its ID token.
    ///
    /// Failure disables the session for good.
    pub async fn sign_up(&mut self, api_key: &str, now_secs: u64) -> Transition {
        match self.request_sign_up(api_key, now_secs).await {
            Ok(credentials) => self.session.signed_up(credentials),
            Err(e) => {
                error!("Anonymous sign-up failed: {}", e);
                self.session.sign_up_failed()
            }
        }
    }

    async fn request_sign_up(
        &mut self,
        api_key: &str,
        now_secs: u64,
    ) -> Result<Credentials, CloudError> {
        let target = format!("/v1/accounts:signUp?key={}", api_key);
        let request = render_request(Method::Post, SIGN_UP_HOST, &target, Some(SIGN_UP_BODY));

        let mut parser = ResponseParser::new(Collect::with_limit(SIGN_UP_BODY_LIMIT));
        self.transport
            .exchange(SIGN_UP_HOST, &request, &mut parser)
            .await
            .map_err(CloudError::transport)?;

        let status = parser.finish()?;
        if !(200..300).contains(&status) {
            return Err(CloudError::Status(status));
        }

        let body = parser.into_sink().into_bytes();
        let body = core::str::from_utf8(&body).map_err(|_| CloudError::MalformedBody)?;
        let id_token = json::string_field(body, "idToken")
            .filter(|token| !token.is_empty())
            .ok_or(CloudError::MalformedBody)?;
        let lifetime = json::string_field(body, "expiresIn")
            .and_then(|secs| secs.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        debug!("Signed up, token valid for {}s", lifetime);
        Ok(Credentials {
            id_token: String::from(id_token),
            expires_at: now_secs.saturating_add(lifetime),
        })
    }

    /// Expire the session if its token is about to run out.
    pub fn poll_session(&mut self, now_secs: u64) -> Option<Transition> {
        self.session.expire_if_due(now_secs)
    }

    fn target(&self, path: &str, query: &str) -> Result<String, CloudError> {
        let token = self.session.id_token().ok_or(CloudError::NotAuthenticated)?;
        let path = path.trim_matches('/');
        Ok(format!("/{}.json?auth={}&{}", path, token, query))
    }

    async fn execute<S: BodySink>(
        &mut self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<&str>,
        sink: S,
    ) -> Result<S, CloudError> {
        let target = self.target(path, query)?;
        let request = render_request(method, &self.host, &target, body);

        let mut parser = ResponseParser::new(sink);
        self.transport
            .exchange(&self.host, &request, &mut parser)
            .await
            .map_err(CloudError::transport)?;

        let framing = parser.finish();
        if let Some(status) = parser.status() {
            self.check_status(status)?;
        }
        framing?;
        Ok(parser.into_sink())
    }

    fn check_status(&mut self, status: u16) -> Result<(), CloudError> {
        match status {
            200..=299 => Ok(()),
            401 | 403 => {
                warn!("Database rejected token ({})", status);
                self.session.invalidate();
                Err(CloudError::Unauthorized(status))
            }
            _ => Err(CloudError::Status(status)),
        }
    }
}

impl<T: HttpTransport> Database for RestDatabase<T> {
    fn is_ready(&self) -> bool {
        self.transport.is_ready() && self.session.is_ready()
    }

    async fn children(&mut self, path: &str) -> Result<ChildSummary, CloudError> {
        let scanner = self
            .execute(Method::Get, path, "shallow=true", None, ShallowKeyScanner::new())
            .await?;
        scanner.finish().ok_or(CloudError::MalformedBody)
    }

    async fn delete(&mut self, path: &str) -> Result<(), CloudError> {
        self.execute(Method::Delete, path, "print=silent", None, Discard)
            .await
            .map(|_| ())
    }

    async fn set_number(&mut self, path: &str, value: f32) -> Result<(), CloudError> {
        let body = json::number(value);
        self.execute(Method::Put, path, "print=silent", Some(body.as_str()), Discard)
            .await
            .map(|_| ())
    }
}
