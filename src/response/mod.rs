//! The `Response` value and wire serialization (`spec.md` §3, §4.D).
//! Grounded on `examples/original_source/oahttp/response.py`'s `Response`
//! base class and its status-specific subclasses.

pub mod body;
pub mod status;

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::headers::HeaderMap;
use crate::transport::WriteGate;
use crate::version::Version;
use body::ResponseBody;
use status::Status;

pub struct Response {
    pub status: Status,
    pub http_version: Version,
    pub headers: HeaderMap,
    /// Ordered map keyed by cookie name, rendered as `Set-Cookie` lines in
    /// insertion order (`spec.md` §3). Mutate via [`Response::with_cookie`]
    /// so a repeated name replaces rather than duplicates.
    pub set_cookies: Vec<(String, String)>,
    pub body: ResponseBody,
    /// Set by [`Response::upgrade`]; tells the connection driver (`spec.md`
    /// §4.F) this is a 101 response that hands the connection to a new
    /// protocol, as opposed to a plain status response.
    pub is_upgrade: bool,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "ResponseBody::Empty"),
            ResponseBody::Static(data) => write!(f, "ResponseBody::Static({} bytes)", data.len()),
            ResponseBody::File { len, .. } => write!(f, "ResponseBody::File({} bytes)", len),
            ResponseBody::Chunked(_) => write!(f, "ResponseBody::Chunked(..)"),
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("http_version", &self.http_version)
            .field("body", &self.body)
            .finish()
    }
}

impl Response {
    pub fn new(status: Status) -> Response {
        Response {
            status,
            http_version: Version::Http11,
            headers: HeaderMap::new(),
            set_cookies: Vec::new(),
            body: ResponseBody::Empty,
            is_upgrade: false,
        }
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Adds `cookie` to the outgoing `Set-Cookie` lines. `set_cookies` is an
    /// ordered map keyed by cookie name (`spec.md` §3); a second call with
    /// the same name replaces the first rather than emitting a second line,
    /// matching `response.py`'s `self.set_cookies: dict[str, Cookie] = {}`.
    pub fn with_cookie(mut self, cookie: &crate::cookie::Cookie) -> Self {
        let line = cookie.generate_set_cookie();
        match self.set_cookies.iter_mut().find(|(name, _)| *name == cookie.name) {
            Some((_, existing)) => *existing = line,
            None => self.set_cookies.push((cookie.name.clone(), line)),
        }
        self
    }

    // -- common constructors, grounded on response.py's subclasses --

    pub fn ok(body: ResponseBody) -> Response {
        Response::new(Status::OK).with_body(body)
    }

    pub fn created() -> Response {
        Response::new(Status::CREATED)
    }

    pub fn no_content() -> Response {
        Response::new(Status::NO_CONTENT)
    }

    pub fn not_modified() -> Response {
        Response::new(Status::NOT_MODIFIED)
    }

    pub fn continue_100() -> Response {
        Response::new(Status::CONTINUE)
    }

    pub fn not_found() -> Response {
        Response::new(Status::NOT_FOUND).with_body(ResponseBody::Static(b"Not Found".to_vec()))
    }

    pub fn gone() -> Response {
        Response::new(Status::GONE)
    }

    pub fn forbidden() -> Response {
        Response::new(Status::FORBIDDEN)
    }

    pub fn conflict() -> Response {
        Response::new(Status::CONFLICT)
    }

    pub fn bad_request() -> Response {
        Response::new(Status::BAD_REQUEST)
    }

    pub fn not_acceptable() -> Response {
        Response::new(Status::NOT_ACCEPTABLE)
    }

    pub fn unsupported_media_type() -> Response {
        Response::new(Status::UNSUPPORTED_MEDIA_TYPE)
    }

    pub fn expectation_failed() -> Response {
        Response::new(Status::EXPECTATION_FAILED)
    }

    pub fn uri_too_long() -> Response {
        Response::new(Status::URI_TOO_LONG)
    }

    pub fn method_not_allowed(allowed_methods: &[String]) -> Response {
        Response::new(Status::METHOD_NOT_ALLOWED).header("allow", allowed_methods.join(", "))
    }

    pub fn upgrade_required() -> Response {
        Response::new(Status::UPGRADE_REQUIRED).header("upgrade", "websocket")
    }

    /// `101 Switching Protocols`, accepting the handshake with `accept`
    /// (e.g. the `Sec-WebSocket-Accept` value from `crate::websocket`).
    pub fn upgrade(upgrade_to: &str, accept_header: Option<(&str, String)>) -> Response {
        let mut resp = Response::new(Status::SWITCHING_PROTOCOLS)
            .header("connection", "upgrade")
            .header("upgrade", upgrade_to);
        if let Some((name, value)) = accept_header {
            resp = resp.header(name, value);
        }
        resp.is_upgrade = true;
        resp
    }

    pub fn redirect(location: &str, permanent: bool, can_change_method: bool) -> Response {
        Response::new(Status::redirect_for(permanent, can_change_method)).header("location", location)
    }

    /// `501`, or `503` with `Retry-After` if `retry_after_seconds` is set
    /// (`SPEC_FULL.md` §3 "Retry-After-aware 503 wrapping").
    pub fn not_implemented() -> Response {
        Response::new(Status::NOT_IMPLEMENTED)
    }

    pub fn service_unavailable(retry_after_seconds: Option<u64>) -> Response {
        let mut resp = Response::new(Status::SERVICE_UNAVAILABLE);
        if let Some(secs) = retry_after_seconds {
            resp = resp.header("retry-after", secs.to_string());
        }
        resp
    }

    pub fn internal_server_error() -> Response {
        Response::new(Status::INTERNAL_SERVER_ERROR)
    }

    /// Strips the body, keeping headers intact — used for `HEAD` requests
    /// falling back onto a `GET` handler (`spec.md` §4.E, testable property
    /// #6).
    pub fn strip_body_for_head(&mut self) {
        self.headers.remove("transfer-encoding");
        // content-length is left as-is: a HEAD response reports the length
        // the equivalent GET body would have had, per RFC 9110 §9.3.2.
        self.body = ResponseBody::Empty;
    }

    /// Writes status line, headers, `Set-Cookie` lines, the blank line,
    /// then the body (`spec.md` §4.D `send()`).
    pub async fn send<W>(
        mut self,
        http_version: Version,
        server_banner: &str,
        out: &mut W,
        gate: &WriteGate,
        debug_assert_headers: bool,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.http_version = http_version;
        let informational = self.status.code < 200;
        if !informational {
            self.body.set_framing_headers(&mut self.headers);
            if !self.headers.contains("date") {
                let date = crate::date::now_imf_fixdate();
                if !date.is_empty() {
                    self.headers.set("date", date);
                }
            }
            if !self.headers.contains("server") && !server_banner.is_empty() {
                self.headers.set("server", server_banner);
            }
        }

        if debug_assert_headers {
            for (name, value) in self.headers.iter() {
                debug_assert!(crate::headers::is_token(name.as_bytes()), "invalid header name {:?}", name);
                debug_assert!(
                    !value.as_bytes().iter().any(|&b| b == b'\r' || b == b'\n'),
                    "header value contains a line break: {:?}",
                    name
                );
            }
        }

        let mut head = Vec::new();
        head.extend_from_slice(http_version.as_bytes());
        head.push(b' ');
        head.extend_from_slice(&self.status.line_bytes());
        head.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        for (_, line) in &self.set_cookies {
            head.extend_from_slice(b"set-cookie: ");
            head.extend_from_slice(line.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");

        gate.wait().await;
        out.write_all(&head).await?;

        self.body.write_to(out, gate).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn basic_get_response_matches_e1() {
        let resp = Response::ok(ResponseBody::Static(b"ok".to_vec()));
        let mut out = Vec::new();
        resp.send(Version::Http11, "originhttp", &mut out, &WriteGate::new(), false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nok"));
    }

    #[tokio::test]
    async fn method_not_allowed_sets_allow_header() {
        let resp = Response::method_not_allowed(&["GET".to_string(), "HEAD".to_string()]);
        let mut out = Vec::new();
        resp.send(Version::Http11, "", &mut out, &WriteGate::new(), false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("allow: GET, HEAD\r\n"));
    }

    #[tokio::test]
    async fn head_fallback_strips_body_keeps_headers() {
        let mut resp = Response::ok(ResponseBody::Static(b"hello".to_vec()));
        resp.body.set_framing_headers(&mut resp.headers);
        resp.strip_body_for_head();
        let mut out = Vec::new();
        resp.send(Version::Http11, "", &mut out, &WriteGate::new(), false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
