//! In-process stand-in for Firebase anonymous auth and the Realtime Database
//!
//! Requests arrive as the exact bytes the firmware would send over TLS and
//! replies are fed back through the same response parser, so the whole REST
//! client runs unmodified.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use log::debug;

use sspot_core::cloud::{BodySink, HttpTransport, ResponseParser, SIGN_UP_HOST};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeError {
    Offline,
    BadRequest,
}

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("network unreachable"),
            Self::BadRequest => f.write_str("unparseable request"),
        }
    }
}

struct Request<'a> {
    method: &'a str,
    path: &'a str,
    query: &'a str,
    body: &'a str,
}

impl<'a> Request<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n")?;
        let mut parts = head.lines().next()?.split(' ');
        let method = parts.next()?;
        let target = parts.next()?;
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Some(Self {
            method,
            path,
            query,
            body,
        })
    }

    fn param(&self, name: &str) -> Option<&'a str> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Database node addressed by `/<node>.json`
    fn node(&self) -> Option<&'a str> {
        self.path
            .strip_suffix(".json")
            .map(|node| node.trim_matches('/'))
    }
}

/// Flat store of leaf values keyed by their slash-separated path.
///
/// The sorted map makes listings come out in key order, as the real service
/// serialises them.
pub struct FakeFirebase {
    now: Rc<Cell<u64>>,
    host: String,
    token_lifetime: u64,
    /// token -> expiry in simulated seconds
    tokens: HashMap<String, u64>,
    values: BTreeMap<String, f64>,
    issued: u32,
    pub online: bool,
}

impl FakeFirebase {
    pub fn new(host: &str, now: Rc<Cell<u64>>, token_lifetime: u64) -> Self {
        Self {
            now,
            host: host.to_owned(),
            token_lifetime,
            tokens: HashMap::new(),
            values: BTreeMap::new(),
            issued: 0,
            online: true,
        }
    }

    /// Distinct children directly under `node`, in key order
    pub fn children(&self, node: &str) -> Vec<&str> {
        let prefix = format!("{}/", node.trim_matches('/'));
        let mut keys: Vec<&str> = self
            .values
            .keys()
            .filter_map(|path| path.strip_prefix(prefix.as_str()))
            .map(|rest| rest.split('/').next().unwrap_or(rest))
            .collect();
        keys.dedup();
        keys
    }

    pub fn value(&self, path: &str) -> Option<f64> {
        self.values.get(path.trim_matches('/')).copied()
    }

    fn respond(&mut self, host: &str, request: &Request<'_>) -> String {
        if host == SIGN_UP_HOST {
            return self.sign_up(request);
        }
        if host != self.host {
            return reply(404, "Not Found", "");
        }

        let authorized = request
            .param("auth")
            .and_then(|token| self.tokens.get(token))
            .is_some_and(|expiry| *expiry > self.now.get());
        if !authorized {
            return reply(401, "Unauthorized", "{\"error\":\"Permission denied\"}");
        }

        let Some(node) = request.node() else {
            return reply(400, "Bad Request", "{\"error\":\"Invalid path\"}");
        };

        match request.method {
            "GET" if request.param("shallow") == Some("true") => {
                let children = self.children(node);
                let body = if children.is_empty() {
                    String::from("null")
                } else {
                    let entries: Vec<String> =
                        children.iter().map(|key| format!("\"{}\":true", key)).collect();
                    format!("{{{}}}", entries.join(","))
                };
                reply(200, "OK", &body)
            }
            "PUT" => match request.body.trim().parse::<f64>() {
                Ok(value) => {
                    self.values.insert(node.to_owned(), value);
                    reply(204, "No Content", "")
                }
                Err(_) => reply(400, "Bad Request", "{\"error\":\"Invalid data\"}"),
            },
            "DELETE" => {
                let prefix = format!("{}/", node);
                self.values
                    .retain(|path, _| path != node && !path.starts_with(prefix.as_str()));
                reply(204, "No Content", "")
            }
            _ => reply(405, "Method Not Allowed", ""),
        }
    }

    fn sign_up(&mut self, request: &Request<'_>) -> String {
        if request.method != "POST" || request.param("key").is_none_or(str::is_empty) {
            return reply(400, "Bad Request", "{\"error\":{\"message\":\"API key not valid\"}}");
        }
        self.issued += 1;
        let token = format!("sim-token-{}", self.issued);
        self.tokens
            .insert(token.clone(), self.now.get() + self.token_lifetime);
        let body = format!(
            "{{\"kind\":\"identitytoolkit#SignupNewUserResponse\",\"idToken\":\"{}\",\"refreshToken\":\"sim-refresh\",\"expiresIn\":\"{}\",\"localId\":\"sim-user\"}}",
            token, self.token_lifetime
        );
        reply(200, "OK", &body)
    }
}

fn reply(status: u16, reason: &str, body: &str) -> String {
    if body.is_empty() {
        return format!("HTTP/1.1 {} {}\r\nConnection: close\r\n\r\n", status, reason);
    }
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
}

impl HttpTransport for FakeFirebase {
    type Error = FakeError;

    fn is_ready(&self) -> bool {
        self.online
    }

    async fn exchange<S: BodySink>(
        &mut self,
        host: &str,
        request: &[u8],
        response: &mut ResponseParser<S>,
    ) -> Result<(), Self::Error> {
        if !self.online {
            return Err(FakeError::Offline);
        }
        let raw = std::str::from_utf8(request).map_err(|_| FakeError::BadRequest)?;
        let parsed = Request::parse(raw).ok_or(FakeError::BadRequest)?;
        debug!("{} {}{}", parsed.method, host, parsed.path);

        let reply = self.respond(host, &parsed);
        // Mimic TCP segmentation
        for segment in reply.as_bytes().chunks(64) {
            response.feed(segment);
        }
        Ok(())
    }
}
