//! The `Request` value (`spec.md` §3) and its resumable parser (`spec.md`
//! §4.B). Grounded on `examples/original_source/oahttp/request.py`'s
//! `Request` class: method/target/headers/cookies/body plus the cached
//! `scheme`/`host`/`absolute_target` accessors and `X-Forwarded-Prefix`
//! handling from `SPEC_FULL.md` §3.

pub mod body;
pub mod parser;

use std::time::Instant;

use crate::accept::Preference;
use crate::headers::HeaderMap;
use crate::version::Version;
use body::RequestBody;

/// Which body framing the parser selected once headers finished
/// (`spec.md` §4.B "body framing selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Fixed(u64),
    Chunked,
}

/// An immutable snapshot of ambient context captured once at request
/// ingress and handed to the dispatch task by value (`SPEC_FULL.md` §3,
/// `spec.md` §9 "Context propagation") — never thread-local state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub peer_addr: std::net::SocketAddr,
    pub local_addr: std::net::SocketAddr,
    pub sequence: u64,
    pub arrived_at: Instant,
}

/// A single HTTP request, mutated in place by the parser and then handed
/// (by reference) to the dispatcher.
pub struct Request {
    pub method: String,
    pub target: String,
    pub raw_query: Vec<u8>,
    pub http_version: Version,
    pub headers: HeaderMap,
    pub cookies: Vec<(Vec<u8>, Vec<u8>)>,
    pub body_framing: BodyFraming,
    pub body: RequestBody,
    pub path_params: std::collections::HashMap<String, String>,
    pub ready: bool,
    pub context: RequestContext,
    forwarded_prefix_stripped: Option<String>,
}

impl Request {
    /// Blank request the parser fills in as it runs; real construction goes
    /// through the connection driver, which supplies a [`RequestContext`].
    pub fn new_blank() -> Request {
        Request {
            method: String::new(),
            target: String::new(),
            raw_query: Vec::new(),
            http_version: Version::Http11,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body_framing: BodyFraming::Empty,
            body: RequestBody::empty(),
            path_params: std::collections::HashMap::new(),
            ready: false,
            context: RequestContext {
                peer_addr: "0.0.0.0:0".parse().unwrap(),
                local_addr: "0.0.0.0:0".parse().unwrap(),
                sequence: 0,
                arrived_at: Instant::now(),
            },
            forwarded_prefix_stripped: None,
        }
    }

    pub fn with_context(context: RequestContext) -> Request {
        Request { context, ..Request::new_blank() }
    }

    /// Instantiates the right [`RequestBody`] once framing is known, per the
    /// thresholds in `config`.
    pub fn attach_body(&mut self, max_in_memory_body: usize) {
        self.body = match self.body_framing {
            BodyFraming::Empty => RequestBody::empty(),
            BodyFraming::Fixed(n) => RequestBody::fixed(n, max_in_memory_body),
            BodyFraming::Chunked => RequestBody::chunked(max_in_memory_body),
        };
    }

    /// `https` if `X-Forwarded-Proto` says so, else `http`.
    pub fn scheme(&self) -> &str {
        match self.headers.get_combined("x-forwarded-proto") {
            Some(ref v) if v.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        }
    }

    /// `Host` header value, falling back to the empty string on HTTP/1.0
    /// requests that omitted it.
    pub fn host(&self) -> String {
        self.headers.get_combined("host").unwrap_or_default()
    }

    pub fn absolute_target(&self) -> String {
        format!("{}://{}{}", self.scheme(), self.host(), self.target)
    }

    /// The path used for routing, with any `X-Forwarded-Prefix` stripped
    /// (`SPEC_FULL.md` §3), computed once and cached.
    pub fn route_path(&mut self) -> &str {
        if self.forwarded_prefix_stripped.is_none() {
            let stripped = match self.headers.get_combined("x-forwarded-prefix") {
                Some(prefix) if self.target.starts_with(&prefix) => {
                    let rest = &self.target[prefix.len()..];
                    if rest.starts_with('/') { rest.to_string() } else { format!("/{}", rest) }
                }
                _ => self.target.clone(),
            };
            self.forwarded_prefix_stripped = Some(stripped);
        }
        self.forwarded_prefix_stripped.as_deref().unwrap()
    }

    pub fn query_params(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.raw_query).into_owned().collect()
    }

    pub fn accept(&self) -> Preference {
        Preference::parse(self.headers.get_combined("accept").as_deref().map(str::as_bytes))
    }

    pub fn accept_language(&self) -> Preference {
        Preference::parse(self.headers.get_combined("accept-language").as_deref().map(str::as_bytes))
    }

    pub fn accept_encoding(&self) -> Preference {
        Preference::parse(self.headers.get_combined("accept-encoding").as_deref().map(str::as_bytes))
    }

    /// Whether this request asked for `100-continue` (`spec.md` §4.F).
    pub fn expects_continue(&self) -> bool {
        self.headers.get_combined("expect").map(|v| crate::headers::is_continue(v.as_bytes())).unwrap_or(false)
    }

    /// Keep-alive per `spec.md` §4.F: HTTP/1.1 without `Connection: close`.
    pub fn wants_keep_alive(&self) -> bool {
        if self.http_version != Version::Http11 {
            return false;
        }
        match self.headers.get_combined("connection") {
            None => true,
            Some(v) => !crate::headers::is_close(v.as_bytes()),
        }
    }

    pub fn wants_upgrade(&self) -> bool {
        self.headers.get_combined("connection").map(|v| crate::headers::connection_has_upgrade(v.as_bytes())).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn blank_with_headers(pairs: &[(&str, &str)]) -> Request {
        let mut r = Request::new_blank();
        for (k, v) in pairs {
            r.headers.append(k.to_string(), v.to_string());
        }
        r
    }

    #[test]
    fn route_path_strips_forwarded_prefix() {
        let mut r = blank_with_headers(&[("x-forwarded-prefix", "/api")]);
        r.target = "/api/users".to_string();
        assert_eq!(r.route_path(), "/users");
    }

    #[test]
    fn route_path_untouched_without_prefix_header() {
        let mut r = Request::new_blank();
        r.target = "/users".to_string();
        assert_eq!(r.route_path(), "/users");
    }

    #[test]
    fn keep_alive_defaults_true_on_http11() {
        let r = Request::new_blank();
        assert!(r.wants_keep_alive());
    }

    #[test]
    fn keep_alive_false_on_http10() {
        let mut r = Request::new_blank();
        r.http_version = Version::Http10;
        assert!(!r.wants_keep_alive());
    }

    #[test]
    fn connection_close_disables_keep_alive() {
        let r = blank_with_headers(&[("connection", "close")]);
        assert!(!r.wants_keep_alive());
    }

    #[test]
    fn query_params_parse_form_encoded_pairs() {
        let mut r = Request::new_blank();
        r.raw_query = b"a=1&b=two".to_vec();
        let params = r.query_params();
        assert_eq!(params, vec![("a".to_string(), "1".to_string()), ("b".to_string(), "two".to_string())]);
    }
}
