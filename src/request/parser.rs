//! Resumable start-line + headers parser (`spec.md` §4.B).
//!
//! Grounded on `examples/original_source/oahttp/request.py`'s
//! `_receive_data`/`_set_header`, reworked around repeated calls over a
//! [`crate::buffer::ReadBuffer`] instead of a single regex pass, so that
//! incremental byte-by-byte feeding parses identically to whole-buffer
//! feeding (`spec.md` §8, testable property #1).

use crate::buffer::ReadBuffer;
use crate::error::Error;
use crate::headers::{is_token, parse_header_line, trim_ows};
use crate::request::{BodyFraming, Request};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    StartLine,
    Headers,
    Ready,
}

pub struct Parser {
    state: ParseState,
    method_captured: bool,
}

impl Parser {
    pub fn new() -> Parser {
        Parser { state: ParseState::StartLine, method_captured: false }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// True once a start-line has parsed successfully, even if headers are
    /// still incomplete. Used by the driver to decide whether a parse
    /// failure deserves a `414` or just a silent close (`spec.md` §4.B).
    pub fn method_captured(&self) -> bool {
        self.method_captured
    }

    /// Advances parsing as far as `buf` allows. Returns `Ok(true)` once the
    /// request reaches `ready` (start-line + headers fully parsed and body
    /// framing selected); `Ok(false)` if more bytes are needed.
    pub fn feed(
        &mut self,
        buf: &mut ReadBuffer,
        max_line_length: usize,
        request: &mut Request,
    ) -> Result<bool, Error> {
        loop {
            match self.state {
                ParseState::StartLine => match buf.read_line(max_line_length)? {
                    None => return Ok(false),
                    Some(line) => {
                        parse_start_line(line, request)?;
                        self.method_captured = true;
                        self.state = ParseState::Headers;
                    }
                },
                ParseState::Headers => match buf.read_line(max_line_length)? {
                    None => return Ok(false),
                    Some(line) if line.is_empty() => {
                        finish_headers(request)?;
                        self.state = ParseState::Ready;
                        return Ok(true);
                    }
                    Some(line) => {
                        apply_header_line(line, request)?;
                    }
                },
                ParseState::Ready => return Ok(true),
            }
        }
    }
}

/// `METHOD SP target[?query] SP HTTP/MAJOR.MINOR`.
fn parse_start_line(line: &[u8], request: &mut Request) -> Result<(), Error> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let method = parts.next().unwrap_or(b"");
    let target = parts.next().ok_or(Error::Syntax("missing request target"))?;
    let version = parts.next().ok_or(Error::Syntax("missing HTTP version"))?;

    if !is_token(method) {
        return Err(Error::Syntax("invalid method token"));
    }
    if target != b"*" && !target.starts_with(b"/") {
        return Err(Error::Syntax("target must start with '/' or be '*'"));
    }
    let version = parse_version(version)?;

    let (path, query) = match target.iter().position(|&b| b == b'?') {
        Some(i) => (&target[..i], target[i + 1..].to_vec()),
        None => (target, Vec::new()),
    };
    let decoded = percent_decode(path);

    request.method = String::from_utf8_lossy(method).into_owned();
    request.target = decoded;
    request.raw_query = query;
    request.http_version = version;
    Ok(())
}

fn parse_version(v: &[u8]) -> Result<Version, Error> {
    let rest = v.strip_prefix(b"HTTP/").ok_or(Error::Syntax("expected HTTP/ version"))?;
    let mut parts = rest.splitn(2, |&b| b == b'.');
    let major = parts.next().unwrap_or(b"");
    let minor = parts.next().ok_or(Error::Syntax("malformed HTTP version"))?;
    if major != b"1" {
        return Err(Error::Syntax("unsupported HTTP major version"));
    }
    Version::from_minor(minor).ok_or(Error::Syntax("unsupported HTTP minor version"))
}

fn apply_header_line(line: &[u8], request: &mut Request) -> Result<(), Error> {
    let (name, value) = parse_header_line(line)?;
    if name == "cookie" {
        for (k, v) in crate::cookie::parse_cookie_header(value.as_bytes()) {
            request.cookies.push((k, v));
        }
    } else {
        request.headers.append(name, value);
    }
    Ok(())
}

fn finish_headers(request: &mut Request) -> Result<(), Error> {
    if request.http_version == Version::Http11 && !request.headers.contains("host") {
        return Err(Error::Syntax("missing Host header on HTTP/1.1"));
    }

    let transfer_encoding = request.headers.get_combined("transfer-encoding");
    let content_length = request.headers.get_combined("content-length");

    request.body_framing = match (transfer_encoding, content_length) {
        (Some(_), Some(_)) => {
            return Err(Error::Syntax("Transfer-Encoding and Content-Length both present"));
        }
        (Some(te), None) => {
            if crate::headers::is_chunked(te.as_bytes()) {
                BodyFraming::Chunked
            } else {
                return Err(Error::NotImplemented("transfer-encoding other than chunked"));
            }
        }
        (None, Some(len)) => {
            let len = trim_ows(len.as_bytes());
            let len: u64 =
                std::str::from_utf8(len).ok().and_then(|s| s.parse().ok()).ok_or(Error::Syntax("invalid Content-Length"))?;
            if len == 0 {
                BodyFraming::Empty
            } else {
                BodyFraming::Fixed(len)
            }
        }
        (None, None) => BodyFraming::Empty,
    };
    request.ready = true;
    Ok(())
}

fn percent_decode(path: &[u8]) -> String {
    let mut out = Vec::with_capacity(path.len());
    let mut i = 0;
    while i < path.len() {
        if path[i] == b'%' && i + 2 < path.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(path[i + 1]), hex_digit(path[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(path[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::Request;

    fn feed_all(input: &[u8], split: usize) -> Request {
        let mut buf = ReadBuffer::new(512);
        let mut parser = Parser::new();
        let mut request = Request::new_blank();
        for chunk in input.chunks(split) {
            let region = buf.writable_region(chunk.len()).unwrap();
            region[..chunk.len()].copy_from_slice(chunk);
            buf.wrote(chunk.len());
            if parser.feed(&mut buf, 8192, &mut request).unwrap() {
                break;
            }
        }
        request
    }

    #[test]
    fn parses_get_incrementally_same_as_whole() {
        let input: &[u8] = b"GET /hello?x=1 HTTP/1.1\r\nHost: example\r\n\r\n";
        let whole = feed_all(input, input.len());
        let incremental = feed_all(input, 1);
        assert_eq!(whole.method, incremental.method);
        assert_eq!(whole.target, incremental.target);
        assert_eq!(whole.raw_query, incremental.raw_query);
        assert_eq!(whole.ready, true);
        assert_eq!(incremental.ready, true);
    }

    #[test]
    fn missing_host_on_http11_is_syntax_error() {
        let mut buf = ReadBuffer::new(256);
        let mut parser = Parser::new();
        let mut request = Request::new_blank();
        let input = b"GET / HTTP/1.1\r\n\r\n";
        let region = buf.writable_region(input.len()).unwrap();
        region[..input.len()].copy_from_slice(input);
        buf.wrote(input.len());
        let err = parser.feed(&mut buf, 8192, &mut request).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn http10_allows_missing_host() {
        let input: &[u8] = b"GET / HTTP/1.0\r\n\r\n";
        let request = feed_all(input, input.len());
        assert!(request.ready);
    }

    #[test]
    fn chunked_and_content_length_together_is_syntax_error() {
        let mut buf = ReadBuffer::new(256);
        let mut parser = Parser::new();
        let mut request = Request::new_blank();
        let input = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n";
        let region = buf.writable_region(input.len()).unwrap();
        region[..input.len()].copy_from_slice(input);
        buf.wrote(input.len());
        let err = parser.feed(&mut buf, 8192, &mut request).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn percent_decodes_target_path() {
        let input: &[u8] = b"GET /a%20b HTTP/1.1\r\nHost: x\r\n\r\n";
        let request = feed_all(input, input.len());
        assert_eq!(request.target, "/a b");
    }
}
