//! Connection configuration (`spec.md` §6 "Configuration surface"),
//! builder-styled the way the teacher's `server::Config` is (see
//! `examples/swindon-rs-tk-http/src/server/config.rs`).

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub buffer_size: usize,
    pub max_line_length: usize,
    pub max_in_memory_body: usize,
    pub timeout_process: Duration,
    pub server_banner: String,
    pub trace_enabled: bool,
    pub debug_assert_headers: bool,
    pub inflight_request_limit: usize,
    pub inflight_request_prealloc: usize,
}

impl Config {
    pub fn new() -> Config {
        Config {
            buffer_size: 16 * 1024,
            max_line_length: 8 * 1024,
            max_in_memory_body: 1024 * 1024,
            timeout_process: Duration::from_secs(30),
            server_banner: "originhttp".to_string(),
            trace_enabled: false,
            debug_assert_headers: cfg!(debug_assertions),
            inflight_request_limit: 2,
            inflight_request_prealloc: 0,
        }
    }

    /// Size of the per-connection receive buffer. Must exceed 9 bytes
    /// (`spec.md` §6).
    pub fn buffer_size(&mut self, value: usize) -> &mut Self {
        assert!(value > 9, "buffer_size must exceed 9 bytes");
        self.buffer_size = value;
        self
    }

    pub fn max_line_length(&mut self, value: usize) -> &mut Self {
        self.max_line_length = value;
        self
    }

    pub fn max_in_memory_body(&mut self, value: usize) -> &mut Self {
        self.max_in_memory_body = value;
        self
    }

    pub fn timeout_process(&mut self, value: Duration) -> &mut Self {
        self.timeout_process = value;
        self
    }

    pub fn server_banner(&mut self, value: impl Into<String>) -> &mut Self {
        self.server_banner = value.into();
        self
    }

    pub fn trace_enabled(&mut self, value: bool) -> &mut Self {
        self.trace_enabled = value;
        self
    }

    pub fn debug_assert_headers(&mut self, value: bool) -> &mut Self {
        self.debug_assert_headers = value;
        self
    }

    /// A number of inflight requests until we stop reading more requests.
    pub fn inflight_request_limit(&mut self, value: usize) -> &mut Self {
        self.inflight_request_limit = value;
        self
    }

    /// Size of the queue preallocated for holding requests. Should be
    /// smaller than `inflight_request_limit`.
    pub fn inflight_request_prealloc(&mut self, value: usize) -> &mut Self {
        self.inflight_request_prealloc = value;
        self
    }

    /// Creates an `Arc`'d config clone to pass to the connection factory.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
