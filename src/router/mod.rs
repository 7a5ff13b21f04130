//! The path trie dispatcher (`spec.md` §3 "Router trie node", §4.E).
//!
//! Grounded on `examples/original_source/oahttp/router.py`: `PathDispatcher`
//! (static/dynamic/fallback children, `<param>` and `...` syntax),
//! `MethodDispatcher` (method table with `HEAD`-falls-back-to-`GET`),
//! `ContentTypeDispatcher` (`Accept` scoring), and `default_dispatcher`
//! (`OPTIONS *` / `TRACE`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::accept::Preference;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

pub type HandlerResult = Result<Response, Error>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A dispatchable endpoint. Router nodes hold `Rc<dyn Handler>` since the
/// whole connection (router included) is pinned to one thread (`spec.md`
/// §5) — no `Send` bound is needed.
pub trait Handler {
    fn call<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, HandlerResult>,
{
    fn call<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, HandlerResult> {
        (self)(request)
    }
}

/// Forces a closure literal to be inferred against the higher-ranked
/// `for<'a> Fn(&'a mut Request) -> BoxFuture<'a, HandlerResult>` bound that
/// `Handler` requires. Closures with an explicit `-> BoxFuture<'_, _>`
/// return-type annotation otherwise get a single concrete lifetime inferred
/// instead of the universally-quantified one `Handler` needs.
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, HandlerResult>,
{
    f
}

/// Scores registered content-type variants against the request's `Accept`
/// preference and picks the highest `q=` match (`spec.md` §4.E).
pub struct ContentTypeDispatcher {
    entries: Vec<(String, Rc<dyn Handler>)>,
}

impl ContentTypeDispatcher {
    pub fn single(handler: Rc<dyn Handler>) -> ContentTypeDispatcher {
        ContentTypeDispatcher { entries: vec![("*/*".to_string(), handler)] }
    }

    pub fn push(&mut self, content_type: &str, handler: Rc<dyn Handler>) {
        self.entries.push((content_type.to_string(), handler));
    }

    pub fn pick(&self, accept: &Preference) -> Option<&Rc<dyn Handler>> {
        // A plain `router.route(path, method, handler)` registration has no
        // real content-type variants to choose between (`spec.md` line 53:
        // subdispatchers are optional children) — invoke it unconditionally
        // rather than gating on `Accept`, which would wrongly reject a
        // request whose `Accept` header doesn't happen to list `*/*`.
        if let [(ct, h)] = self.entries.as_slice() {
            if ct == "*/*" {
                return Some(h);
            }
        }
        self.entries
            .iter()
            .filter_map(|(ct, h)| accept.acceptable(ct).map(|q| (q, h)))
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, h)| h)
    }
}

/// Per-method handler table at one trie node (`spec.md` §4.E step 1).
pub struct MethodDispatcher {
    methods: Vec<(String, ContentTypeDispatcher)>,
    catch_all: Option<Rc<dyn Handler>>,
}

impl MethodDispatcher {
    pub fn new() -> MethodDispatcher {
        MethodDispatcher { methods: Vec::new(), catch_all: None }
    }

    pub fn register(&mut self, method: Option<&str>, content_type: Option<&str>, handler: Rc<dyn Handler>) {
        match method {
            None => self.catch_all = Some(handler),
            Some(m) => {
                let m = m.to_ascii_uppercase();
                let slot = self.methods.iter_mut().find(|(name, _)| *name == m);
                match slot {
                    Some((_, ctd)) => ctd.push(content_type.unwrap_or("*/*"), handler),
                    None => {
                        let ctd = match content_type {
                            Some(ct) => {
                                let mut d = ContentTypeDispatcher { entries: Vec::new() };
                                d.push(ct, handler);
                                d
                            }
                            None => ContentTypeDispatcher::single(handler),
                        };
                        self.methods.push((m, ctd));
                    }
                }
            }
        }
    }

    fn find(&self, method: &str) -> Option<&ContentTypeDispatcher> {
        self.methods.iter().find(|(m, _)| m == method).map(|(_, ctd)| ctd)
    }

    /// Tries this node's method table for `request`. `Ok(None)` means "no
    /// method handlers here at all" (caller should treat remaining path as
    /// unmatched, not a 405); `Err` carries a `405` once handlers exist but
    /// none match.
    pub async fn dispatch(&self, request: &mut Request) -> Option<HandlerResult> {
        let method = request.method.clone();
        if let Some(ctd) = self.find(&method) {
            if let Some(h) = ctd.pick(&request.accept()) {
                return Some(h.call(request).await);
            }
        }
        if method.eq_ignore_ascii_case("HEAD") {
            if let Some(ctd) = self.find("GET") {
                if let Some(h) = ctd.pick(&request.accept()) {
                    let saved_method = std::mem::replace(&mut request.method, "GET".to_string());
                    let mut result = h.call(request).await;
                    request.method = saved_method;
                    if let Ok(resp) = &mut result {
                        resp.strip_body_for_head();
                    }
                    return Some(result);
                }
            }
        }
        if let Some(h) = &self.catch_all {
            return Some(h.call(request).await);
        }
        if !self.methods.is_empty() {
            let allowed: Vec<String> = self.methods.iter().map(|(m, _)| m.clone()).collect();
            return Some(Ok(Response::method_not_allowed(&allowed)));
        }
        None
    }

    /// Union of methods; left (`self`) wins outright on a name conflict
    /// (`spec.md` §4.E "Merging") rather than combining the two
    /// `ContentTypeDispatcher`s, which would let `other`'s entries
    /// outscore `self`'s on a tied `q=`.
    fn merge(&mut self, other: MethodDispatcher) {
        for (name, ctd) in other.methods {
            if !self.methods.iter().any(|(n, _)| *n == name) {
                self.methods.push((name, ctd));
            }
        }
        if self.catch_all.is_none() {
            self.catch_all = other.catch_all;
        }
    }
}

struct DynamicEntry {
    priority: i32,
    seq: u64,
    name: String,
    node: Node,
}

struct FallbackEntry {
    priority: i32,
    seq: u64,
    node: Node,
}

fn sort_stable<T>(items: &mut [T], key: impl Fn(&T) -> (i32, u64)) {
    items.sort_by(|a, b| {
        let (pa, sa) = key(a);
        let (pb, sb) = key(b);
        pb.cmp(&pa).then(sa.cmp(&sb))
    });
}

/// One node of the router trie (`spec.md` §3 "Router trie node").
pub struct Node {
    static_children: HashMap<String, Node>,
    dynamic: Vec<DynamicEntry>,
    fallback: Vec<FallbackEntry>,
    methods: Option<MethodDispatcher>,
}

impl Node {
    pub fn new() -> Node {
        Node { static_children: HashMap::new(), dynamic: Vec::new(), fallback: Vec::new(), methods: None }
    }

    fn register_segments(
        &mut self,
        segs: &[&str],
        priority: i32,
        seq: u64,
        method: Option<&str>,
        content_type: Option<&str>,
        handler: Rc<dyn Handler>,
    ) {
        match segs.split_first() {
            None => {
                self.methods.get_or_insert_with(MethodDispatcher::new).register(method, content_type, handler);
            }
            Some((&"...", _rest)) => {
                let mut child = Node::new();
                child.register_segments(&[], priority, seq, method, content_type, handler);
                self.fallback.push(FallbackEntry { priority, seq, node: child });
                sort_stable(&mut self.fallback, |e| (e.priority, e.seq));
            }
            Some((&first, rest)) => {
                if let Some(name) = first.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                    let mut child = Node::new();
                    child.register_segments(rest, priority, seq, method, content_type, handler);
                    self.dynamic.push(DynamicEntry { priority, seq, name: name.to_string(), node: child });
                    sort_stable(&mut self.dynamic, |e| (e.priority, e.seq));
                } else {
                    self.static_children
                        .entry(first.to_string())
                        .or_insert_with(Node::new)
                        .register_segments(rest, priority, seq, method, content_type, handler);
                }
            }
        }
    }

    /// Recursively unions `other` into `self`: static children merge by
    /// segment, dynamic/fallback lists concatenate and re-sort, method
    /// tables union with `self` (left) winning conflicts (`spec.md` §4.E
    /// "Merging" — see `DESIGN.md` for the open-question resolution on
    /// cross-type priority).
    pub fn merge(&mut self, other: Node) {
        for (seg, node) in other.static_children {
            match self.static_children.get_mut(&seg) {
                Some(existing) => existing.merge(node),
                None => {
                    self.static_children.insert(seg, node);
                }
            }
        }
        self.dynamic.extend(other.dynamic);
        sort_stable(&mut self.dynamic, |e| (e.priority, e.seq));
        self.fallback.extend(other.fallback);
        sort_stable(&mut self.fallback, |e| (e.priority, e.seq));
        match (&mut self.methods, other.methods) {
            (Some(m), Some(o)) => m.merge(o),
            (None, Some(o)) => self.methods = Some(o),
            _ => {}
        }
    }

    /// Walks `remaining` per `spec.md` §4.E's numbered algorithm.
    pub fn dispatch<'a>(&'a self, request: &'a mut Request, remaining: &'a [String]) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if remaining.is_empty() {
                if let Some(md) = &self.methods {
                    if let Some(result) = md.dispatch(request).await {
                        return result;
                    }
                }
                return Err(Error::Response(Response::not_found()));
            }
            let s = remaining[0].as_str();
            let rest = &remaining[1..];
            if s == "." || s.is_empty() {
                return self.dispatch(request, rest).await;
            }
            if s == ".." {
                return Err(Error::Response(Response::not_found()));
            }

            let mut best: Option<Response> = None;

            if let Some(child) = self.static_children.get(s) {
                match child.dispatch(request, rest).await {
                    Ok(resp) => return Ok(resp),
                    Err(Error::Response(r)) if r.status.is_client_error() => best = Some(r),
                    Err(e) => return Err(e),
                }
            }

            for entry in &self.dynamic {
                request.path_params.insert(entry.name.clone(), s.to_string());
                let result = entry.node.dispatch(request, rest).await;
                request.path_params.remove(&entry.name);
                match result {
                    Ok(resp) => return Ok(resp),
                    Err(Error::Response(r)) if r.status.is_client_error() => {
                        if best.is_none() {
                            best = Some(r);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            if !self.fallback.is_empty() {
                let tail: Vec<String> = std::iter::once(s.to_string()).chain(rest.iter().cloned()).collect();
                let joined = tail.join("/");
                for entry in &self.fallback {
                    request.path_params.insert("...".to_string(), joined.clone());
                    let result = entry.node.dispatch(request, &[]).await;
                    request.path_params.remove("...");
                    match result {
                        Ok(resp) => return Ok(resp),
                        Err(Error::Response(r)) if r.status.is_client_error() => {
                            if best.is_none() {
                                best = Some(r);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            Err(Error::Response(best.unwrap_or_else(Response::not_found)))
        })
    }
}

impl Default for Node {
    fn default() -> Node {
        Node::new()
    }
}

/// The top-level router: a root [`Node`] plus a registration-order counter
/// so equal-priority registrations resolve FIFO (`spec.md` §8 property #7).
pub struct Router {
    root: Node,
    next_seq: u64,
}

impl Router {
    pub fn new() -> Router {
        Router { root: Node::new(), next_seq: 0 }
    }

    /// `path` uses the original's route syntax: static segments, `<name>`
    /// for a dynamic segment, `...` for a fallback tail consumer.
    pub fn route(&mut self, path: &str, method: &str, handler: impl Handler + 'static) {
        self.route_with_priority(path, method, 0, handler);
    }

    pub fn route_with_priority(&mut self, path: &str, method: &str, priority: i32, handler: impl Handler + 'static) {
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.root.register_segments(&segs, priority, seq, Some(method), None, Rc::new(handler));
    }

    pub fn route_any_method(&mut self, path: &str, handler: impl Handler + 'static) {
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.root.register_segments(&segs, 0, seq, None, None, Rc::new(handler));
    }

    pub fn route_content_type(
        &mut self,
        path: &str,
        method: &str,
        content_type: &str,
        handler: impl Handler + 'static,
    ) {
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.root.register_segments(&segs, 0, seq, Some(method), Some(content_type), Rc::new(handler));
    }

    pub fn merge(&mut self, other: Router) {
        self.root.merge(other.root);
        self.next_seq = self.next_seq.max(other.next_seq);
    }

    pub async fn dispatch(&self, request: &mut Request) -> Response {
        let path = request.route_path().to_string();
        let segments: Vec<String> = path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
        match self.root.dispatch(request, &segments).await {
            Ok(resp) => resp,
            Err(Error::Response(resp)) => resp,
            Err(_) => Response::internal_server_error(),
        }
    }
}

impl Default for Router {
    fn default() -> Router {
        Router::new()
    }
}

/// `OPTIONS *` and `TRACE`, registered at the lowest priority so user
/// routes always win (`spec.md` §4.E, `SPEC_FULL.md` §3 "Default
/// dispatcher"). `trace_enabled` controls whether `TRACE` echoes (`200`) or
/// is refused (`501`).
pub fn is_asterisk_options(request: &Request) -> bool {
    request.target == "*" && request.method == "OPTIONS"
}

pub fn default_asterisk_response() -> Response {
    Response::new(crate::response::status::Status::OK).header("allow", "GET, HEAD, OPTIONS")
}

pub fn default_trace_response(request: &Request, trace_enabled: bool) -> Response {
    if !trace_enabled {
        return Response::not_implemented();
    }
    let mut echo = format!("{} {} {}\r\n", request.method, request.target, request.http_version);
    for (name, value) in request.headers.iter() {
        echo.push_str(name);
        echo.push_str(": ");
        echo.push_str(value);
        echo.push_str("\r\n");
    }
    Response::new(crate::response::status::Status::OK)
        .header("content-type", "message/http")
        .with_body(crate::response::body::ResponseBody::Static(echo.into_bytes()))
}
