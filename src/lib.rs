//! A full-featured HTTP/1.0 and HTTP/1.1 origin-server engine for the
//! `tokio` stack: a resumable request parser, three body-receiving
//! strategies (in-memory, spill-to-disk, chunked), a response generator
//! with static/file/chunked body writers, and a priority-ordered router.
//!
//! The listening socket, TLS termination, and process supervision are left
//! to the embedder; [`connection::run`] drives one already-accepted
//! connection end to end.

#![recursion_limit = "100"]

pub mod accept;
pub mod buffer;
pub mod chunked;
pub mod config;
pub mod connection;
pub mod cookie;
pub mod date;
pub mod error;
pub mod headers;
pub mod request;
pub mod response;
pub mod router;
pub mod strategy;
pub mod transport;
pub mod version;
pub mod websocket;

pub use config::Config;
pub use connection::ConnectionOutcome;
pub use error::Error;
pub use request::Request;
pub use response::Response;
pub use router::{Handler, Router};
pub use strategy::Strategy;
pub use version::Version;
