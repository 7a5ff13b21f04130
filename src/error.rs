//! The error kinds that can arise while driving a single connection.
//!
//! See `spec.md` §7 ("Error handling design"): parsing failures
//! (`BufferFull`/`LimitExceeded`/`Syntax`/`NotImplemented`), I/O failures,
//! and the `Response`-carrying variant used by handlers (and the router)
//! to "throw" a status response instead of returning one.

use std::io;

use quick_error::quick_error;

use crate::response::Response;

quick_error! {
    /// Failure of the protocol state machine below the dispatcher.
    ///
    /// `Response` is deliberately not boxed: most call sites either hold
    /// one already-built response object or propagate the error unchanged,
    /// so the extra indirection buys nothing.
    #[derive(Debug)]
    pub enum Error {
        /// The read buffer has no room left and no bytes could be
        /// consumed to make room (`spec.md` §4.A).
        BufferFull {
            display("receive buffer is full")
        }
        /// A single line (start-line, header, or chunk-size line) exceeded
        /// `max_line_length` before a terminator was found.
        LimitExceeded {
            display("line exceeds the configured limit")
        }
        /// Malformed start-line, header, or chunk framing.
        Syntax(msg: &'static str) {
            display("syntax error: {}", msg)
        }
        /// A `Transfer-Encoding` other than `chunked` was requested.
        NotImplemented(msg: &'static str) {
            display("not implemented: {}", msg)
        }
        /// A handler (or the router) wants this exact response sent as-is,
        /// rather than being wrapped into a 500.
        Response(resp: Response) {
            display("handler raised a response")
        }
        /// Handler execution did not complete within `timeout_process`.
        HandlerTimeout {
            display("handler timed out")
        }
        /// The connection dropped out from under an in-flight handler.
        TransportLost {
            display("transport lost")
        }
        Io(err: io::Error) {
            display("I/O error: {}", err)
            from()
        }
    }
}

impl From<Response> for Error {
    fn from(resp: Response) -> Error {
        Error::Response(resp)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
