//! Minimal HTTP/1.1 client framing
//!
//! Requests are rendered into a byte buffer in one go. Responses are parsed
//! incrementally as the transport hands over whatever the socket produced, so
//! large bodies can be consumed by a streaming [`BodySink`] without ever
//! being held in memory.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use thiserror_no_std::Error;

/// Longest status/header/chunk-size line kept; the rest of a longer line is dropped.
const MAX_LINE: usize = 512;

const USER_AGENT: &str = "sspot/0.1";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("malformed status line")]
    MalformedStatusLine,
    #[error("invalid Content-Length header")]
    InvalidContentLength,
    #[error("invalid chunk framing")]
    InvalidChunk,
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("connection closed before the response was complete")]
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Render a complete request. The connection is always closed after the reply.
pub fn render_request(method: Method, host: &str, target: &str, body: Option<&str>) -> Vec<u8> {
    let mut out = String::with_capacity(160 + target.len() + body.map_or(0, str::len));
    let _ = write!(
        out,
        "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: application/json\r\nConnection: close\r\n",
        method.as_str(),
        target,
        host,
        USER_AGENT
    );
    match body {
        Some(body) => {
            let _ = write!(
                out,
                "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
        }
        None if matches!(method, Method::Post | Method::Put) => {
            out.push_str("Content-Length: 0\r\n\r\n");
        }
        None => out.push_str("\r\n"),
    }
    out.into_bytes()
}

/// Consumer of response body bytes
pub trait BodySink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), HttpError>;
}

/// Drops the body
#[derive(Debug, Default)]
pub struct Discard;

impl BodySink for Discard {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), HttpError> {
        Ok(())
    }
}

/// Buffers the body up to a fixed limit
#[derive(Debug)]
pub struct Collect {
    buf: Vec<u8>,
    limit: usize,
}

impl Collect {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl BodySink for Collect {
    fn write(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        if self.buf.len() + bytes.len() > self.limit {
            return Err(HttpError::BodyTooLarge(self.limit));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

/// What the transport should do after feeding a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NeedMore,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StatusLine,
    Headers,
    Length(usize),
    UntilClose,
    ChunkSize,
    ChunkData(usize),
    ChunkDataEnd,
    Trailers,
    Done,
}

/// Incremental response parser feeding the body into `S`
pub struct ResponseParser<S> {
    sink: S,
    phase: Phase,
    line: heapless::Vec<u8, MAX_LINE>,
    status: Option<u16>,
    content_length: Option<usize>,
    chunked: bool,
    error: Option<HttpError>,
}

impl<S: BodySink> ResponseParser<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            phase: Phase::StatusLine,
            line: heapless::Vec::new(),
            status: None,
            content_length: None,
            chunked: false,
            error: None,
        }
    }

    /// Feed bytes received from the connection.
    ///
    /// Bytes past the end of the response are ignored.
    pub fn feed(&mut self, mut data: &[u8]) -> Progress {
        while !data.is_empty() && self.error.is_none() {
            let consumed = match self.phase {
                Phase::Done => break,
                Phase::Length(remaining) => {
                    let n = remaining.min(data.len());
                    self.emit(&data[..n]);
                    self.phase = if n == remaining {
                        Phase::Done
                    } else {
                        Phase::Length(remaining - n)
                    };
                    n
                }
                Phase::ChunkData(remaining) => {
                    let n = remaining.min(data.len());
                    self.emit(&data[..n]);
                    self.phase = if n == remaining {
                        Phase::ChunkDataEnd
                    } else {
                        Phase::ChunkData(remaining - n)
                    };
                    n
                }
                Phase::UntilClose => {
                    self.emit(data);
                    data.len()
                }
                _ => {
                    let byte = data[0];
                    if byte == b'\n' {
                        let mut line = core::mem::take(&mut self.line);
                        if line.last() == Some(&b'\r') {
                            line.pop();
                        }
                        if let Err(e) = self.on_line(&line) {
                            self.error = Some(e);
                        }
                    } else {
                        // Overlong lines are truncated
                        let _ = self.line.push(byte);
                    }
                    1
                }
            };
            data = &data[consumed..];
        }
        self.progress()
    }

    pub fn progress(&self) -> Progress {
        if self.error.is_some() || self.phase == Phase::Done {
            Progress::Done
        } else {
            Progress::NeedMore
        }
    }

    /// Status code once the connection has ended.
    ///
    /// A body framed by connection close is complete at this point; any other
    /// unfinished framing means the response was cut short.
    pub fn finish(&self) -> Result<u16, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match self.phase {
            Phase::Done | Phase::UntilClose => self.status.ok_or(HttpError::Truncated),
            _ => Err(HttpError::Truncated),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn emit(&mut self, bytes: &[u8]) {
        if let Err(e) = self.sink.write(bytes) {
            self.error = Some(e);
        }
    }

    fn on_line(&mut self, line: &[u8]) -> Result<(), HttpError> {
        match self.phase {
            Phase::StatusLine => {
                self.status = Some(parse_status_line(line)?);
                self.phase = Phase::Headers;
            }
            Phase::Headers if line.is_empty() => self.phase = self.body_phase(),
            Phase::Headers => self.on_header(line)?,
            Phase::ChunkSize => {
                let size = parse_chunk_size(line)?;
                self.phase = if size == 0 {
                    Phase::Trailers
                } else {
                    Phase::ChunkData(size)
                };
            }
            Phase::ChunkDataEnd => {
                if !line.is_empty() {
                    return Err(HttpError::InvalidChunk);
                }
                self.phase = Phase::ChunkSize;
            }
            Phase::Trailers if line.is_empty() => self.phase = Phase::Done,
            _ => {}
        }
        Ok(())
    }

    fn on_header(&mut self, line: &[u8]) -> Result<(), HttpError> {
        // Headers we don't care about may carry arbitrary bytes
        let Ok(line) = core::str::from_utf8(line) else {
            return Ok(());
        };
        let Some((name, value)) = line.split_once(':') else {
            return Ok(());
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("content-length") {
            let length = value
                .parse::<usize>()
                .map_err(|_| HttpError::InvalidContentLength)?;
            self.content_length = Some(length);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            self.chunked = value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        }
        Ok(())
    }

    fn body_phase(&self) -> Phase {
        match self.status {
            Some(100..=199 | 204 | 304) => Phase::Done,
            _ if self.chunked => Phase::ChunkSize,
            _ => match self.content_length {
                Some(0) => Phase::Done,
                Some(n) => Phase::Length(n),
                None => Phase::UntilClose,
            },
        }
    }
}

fn parse_status_line(line: &[u8]) -> Result<u16, HttpError> {
    let line = core::str::from_utf8(line).map_err(|_| HttpError::MalformedStatusLine)?;
    let mut parts = line.split(' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::MalformedStatusLine);
    }
    let code = parts.next().unwrap_or_default();
    if code.len() != 3 {
        return Err(HttpError::MalformedStatusLine);
    }
    code.parse::<u16>()
        .map_err(|_| HttpError::MalformedStatusLine)
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, HttpError> {
    let line = core::str::from_utf8(line).map_err(|_| HttpError::InvalidChunk)?;
    let size = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(size, 16).map_err(|_| HttpError::InvalidChunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_in_pieces(raw: &[u8], piece: usize) -> ResponseParser<Collect> {
        let mut parser = ResponseParser::new(Collect::with_limit(1024));
        for chunk in raw.chunks(piece) {
            if parser.feed(chunk) == Progress::Done {
                break;
            }
        }
        parser
    }

    #[test]
    fn test_render_get() {
        let request = render_request(Method::Get, "db.example.com", "/SSPOTV1.json?shallow=true", None);
        assert_eq!(
            core::str::from_utf8(&request).unwrap(),
            "GET /SSPOTV1.json?shallow=true HTTP/1.1\r\nHost: db.example.com\r\nUser-Agent: sspot/0.1\r\nAccept: application/json\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_render_put_with_body() {
        let request = render_request(Method::Put, "h", "/a.json", Some("40.0"));
        let text = core::str::from_utf8(&request).unwrap();
        assert!(text.starts_with("PUT /a.json HTTP/1.1\r\n"));
        assert!(text.ends_with("Content-Type: application/json\r\nContent-Length: 4\r\n\r\n40.0"));
    }

    #[test]
    fn test_content_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX: y\r\n\r\nhello";
        for piece in [1, 3, raw.len()] {
            let parser = parse_in_pieces(raw, piece);
            assert_eq!(parser.progress(), Progress::Done);
            assert_eq!(parser.finish(), Ok(200));
            assert_eq!(parser.sink().as_bytes(), b"hello");
        }
    }

    #[test]
    fn test_chunked_body_with_extension_and_trailer() {
        let raw = b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n4;x=1\r\n{\"a\"\r\n6\r\n:true}\r\n0\r\nX-Trailer: 1\r\n\r\n";
        for piece in [1, 2, 7, raw.len()] {
            let parser = parse_in_pieces(raw, piece);
            assert_eq!(parser.finish(), Ok(200));
            assert_eq!(parser.sink().as_bytes(), b"{\"a\":true}");
        }
    }

    #[test]
    fn test_body_until_close() {
        let mut parser = ResponseParser::new(Collect::with_limit(64));
        assert_eq!(parser.feed(b"HTTP/1.0 200 OK\r\n\r\nnull"), Progress::NeedMore);
        assert_eq!(parser.finish(), Ok(200));
        assert_eq!(parser.sink().as_bytes(), b"null");
    }

    #[test]
    fn test_no_content_has_no_body() {
        let parser = parse_in_pieces(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n", 4);
        assert_eq!(parser.finish(), Ok(204));
        assert!(parser.sink().as_bytes().is_empty());
    }

    #[test]
    fn test_truncated_length_body() {
        let mut parser = ResponseParser::new(Discard);
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc");
        assert_eq!(parser.finish(), Err(HttpError::Truncated));
    }

    #[test]
    fn test_malformed_status_line() {
        let mut parser = ResponseParser::new(Discard);
        assert_eq!(parser.feed(b"SSH-2.0-OpenSSH\r\n"), Progress::Done);
        assert_eq!(parser.finish(), Err(HttpError::MalformedStatusLine));
    }

    #[test]
    fn test_invalid_chunk_size() {
        let parser = parse_in_pieces(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n",
            5,
        );
        assert_eq!(parser.finish(), Err(HttpError::InvalidChunk));
    }

    #[test]
    fn test_collect_limit() {
        let mut parser = ResponseParser::new(Collect::with_limit(3));
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(parser.finish(), Err(HttpError::BodyTooLarge(3)));
    }

    #[test]
    fn test_overlong_header_is_tolerated() {
        let mut raw = alloc::vec::Vec::new();
        raw.extend_from_slice(b"HTTP/1.1 401 Unauthorized\r\nX-Long: ");
        raw.extend(core::iter::repeat_n(b'a', 2000));
        raw.extend_from_slice(b"\r\nContent-Length: 2\r\n\r\n{}");
        let parser = parse_in_pieces(&raw, 64);
        assert_eq!(parser.finish(), Ok(401));
        assert_eq!(parser.sink().as_bytes(), b"{}");
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let parser = parse_in_pieces(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokEXTRA", 100);
        assert_eq!(parser.sink().as_bytes(), b"ok");
    }
}
