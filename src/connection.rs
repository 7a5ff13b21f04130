//! The connection driver (`spec.md` §4.F): orchestrates the buffer, parser,
//! body receiver, dispatcher, and response sender for one connection.
//!
//! Grounded on `examples/original_source/oahttp/http_connection.py`'s
//! `HttpConnection(asyncio.BufferedProtocol)` — `buffer_updated`,
//! `_response_callback`, `_prepare_next`, `abort`. That class is built
//! around asyncio's single-threaded event loop and in-place protocol
//! swapping; here the same single-threaded-cooperative model (`spec.md`
//! §5) is expressed as one `tokio::task::spawn_local` per request running
//! inside the caller's `LocalSet`, and upgrade is expressed as *returning*
//! the live socket and any leftover bytes to the caller rather than
//! swapping a protocol object in place (there is no event-loop-level
//! protocol registry in this model) — see `DESIGN.md`.

use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::buffer::ReadBuffer;
use crate::error::Error;
use crate::request::{parser::Parser, BodyFraming, Request, RequestContext};
use crate::response::Response;
use crate::strategy::Strategy;
use crate::transport::{ReadGate, WriteGate};
use crate::version::Version;
use crate::websocket;

/// What became of the connection once `run` returns.
pub enum ConnectionOutcome<S> {
    /// The connection closed (cleanly or otherwise); nothing more to do.
    Closed,
    /// A handler answered with a switching-protocols response. The caller
    /// (an external collaborator per `spec.md` §1) owns `socket` from here;
    /// `leftover` is any bytes already read past the end of the HTTP
    /// request (`spec.md` §8 E8).
    Upgraded { socket: S, leftover: Vec<u8>, handshake: Option<websocket::Handshake> },
}

/// Drives one connection end to end. Must run inside a `tokio::task::LocalSet`
/// (it spawns non-`Send` per-request dispatch tasks via `spawn_local`).
pub async fn run<S>(mut socket: S, strategy: Rc<Strategy>, peer_addr: SocketAddr, local_addr: SocketAddr) -> ConnectionOutcome<S>
where
    S: AsyncRead + AsyncWrite + Unpin + 'static,
{
    let config = strategy.config.clone();
    let mut buf = ReadBuffer::new(config.buffer_size);
    let read_gate = ReadGate::new();
    let write_gate = WriteGate::new();
    let mut sequence: u64 = 0;

    loop {
        let context = RequestContext { peer_addr, local_addr, sequence, arrived_at: Instant::now() };
        let mut request = Request::with_context(context);
        let mut parser = Parser::new();

        let header_result = read_headers(&mut socket, &mut buf, &mut parser, &config, &mut request).await;
        match header_result {
            HeaderOutcome::Ready => {}
            HeaderOutcome::Eof => return ConnectionOutcome::Closed,
            HeaderOutcome::Failed(err) => {
                if !parser.method_captured() && matches!(err, Error::LimitExceeded) {
                    let resp = Response::uri_too_long();
                    let _ = resp.send(Version::Http11, &config.server_banner, &mut socket, &write_gate, false).await;
                }
                return ConnectionOutcome::Closed;
            }
        }

        request.attach_body(config.max_in_memory_body);
        if request.body.receive_data(&mut buf, config.max_line_length).is_err() {
            return ConnectionOutcome::Closed;
        }

        let http_version = request.http_version;
        let keep_alive_requested = request.wants_keep_alive();
        let wants_upgrade = request.wants_upgrade();
        let handshake = websocket::get_handshake(&request).ok().flatten();

        if let Some(expect) = request.headers.get_combined("expect") {
            if crate::headers::is_continue(expect.as_bytes()) {
                if !matches!(request.body_framing, BodyFraming::Empty) {
                    let resp = Response::continue_100();
                    if resp.send(http_version, "", &mut socket, &write_gate, false).await.is_err() {
                        return ConnectionOutcome::Closed;
                    }
                }
            } else {
                let resp = Response::expectation_failed();
                let _ = resp.send(http_version, &config.server_banner, &mut socket, &write_gate, config.debug_assert_headers).await;
                return ConnectionOutcome::Closed;
            }
        }

        let body_handle = request.body.clone();
        let strategy_for_task = strategy.clone();
        let dispatch_timeout = config.timeout_process;
        let mut dispatch_task = tokio::task::spawn_local(async move {
            let mut request = request;
            match tokio::time::timeout(dispatch_timeout, strategy_for_task.dispatch(&mut request)).await {
                Ok(resp) => resp,
                Err(_) => strategy_for_task.wrap_error(Error::HandlerTimeout),
            }
        });

        let response = loop {
            if body_handle.ready() {
                match (&mut dispatch_task).await {
                    Ok(resp) => break resp,
                    Err(_) => break strategy.wrap_error(Error::TransportLost),
                }
            }
            tokio::select! {
                biased;
                joined = &mut dispatch_task => {
                    match joined {
                        Ok(resp) => break resp,
                        Err(_) => break strategy.wrap_error(Error::TransportLost),
                    }
                }
                n = fill_buffer(&mut socket, &mut buf, &read_gate, &body_handle) => {
                    match n {
                        Ok(0) => {
                            dispatch_task.abort();
                            break strategy.wrap_error(Error::TransportLost);
                        }
                        Ok(_) => {
                            if body_handle.receive_data(&mut buf, config.max_line_length).is_err() {
                                dispatch_task.abort();
                                break strategy.wrap_error(Error::TransportLost);
                            }
                        }
                        Err(_) => {
                            dispatch_task.abort();
                            break strategy.wrap_error(Error::TransportLost);
                        }
                    }
                }
            }
        };

        let mut keep_alive = keep_alive_requested;
        let is_upgrade = response.is_upgrade;
        if !is_upgrade && wants_upgrade {
            log::warn!("client requested upgrade but handler did not switch protocols");
            keep_alive = false;
        }

        if response.send(http_version, &config.server_banner, &mut socket, &write_gate, config.debug_assert_headers).await.is_err() {
            return ConnectionOutcome::Closed;
        }

        if is_upgrade {
            let leftover = buf.remaining_view().to_vec();
            return ConnectionOutcome::Upgraded { socket, leftover, handshake };
        }

        if !keep_alive {
            return ConnectionOutcome::Closed;
        }

        body_handle.wait().await;
        read_gate.resume_reading();
        sequence += 1;
    }
}

enum HeaderOutcome {
    Ready,
    Eof,
    Failed(Error),
}

async fn read_headers<S>(
    socket: &mut S,
    buf: &mut ReadBuffer,
    parser: &mut Parser,
    config: &crate::config::Config,
    request: &mut Request,
) -> HeaderOutcome
where
    S: AsyncRead + Unpin,
{
    loop {
        match parser.feed(buf, config.max_line_length, request) {
            Ok(true) => return HeaderOutcome::Ready,
            Ok(false) => {
                let region = match buf.writable_region(0) {
                    Ok(r) => r,
                    Err(e) => return HeaderOutcome::Failed(e),
                };
                match socket.read(region).await {
                    Ok(0) => return HeaderOutcome::Eof,
                    Ok(n) => buf.wrote(n),
                    Err(_) => return HeaderOutcome::Eof,
                }
            }
            Err(e) => return HeaderOutcome::Failed(e),
        }
    }
}

/// Reads more bytes into `buf`, pausing (and later resuming) via
/// `read_gate` when the buffer fills mid-body (`spec.md` §4.C
/// "Backpressure").
async fn fill_buffer<S>(
    socket: &mut S,
    buf: &mut ReadBuffer,
    read_gate: &ReadGate,
    body: &crate::request::body::RequestBody,
) -> std::io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    read_gate.wait_until_resumed().await;
    let region = match buf.writable_region(0) {
        Ok(r) => r,
        Err(_) => {
            read_gate.pause_reading();
            let gate = read_gate.clone();
            body.receive_paused(move || gate.resume_reading());
            read_gate.wait_until_resumed().await;
            buf.writable_region(0).map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "buffer full"))?
        }
    };
    socket.read(region).await.map(|n| {
        if n > 0 {
            buf.wrote(n);
        }
        n
    })
}
