//! The abstract transport contract (`spec.md` §6 "Transport contract").
//!
//! The listening socket, TLS, and how bytes actually reach a peer are
//! external collaborators (`spec.md` §1 "Out of scope") — this module only
//! specifies the interface the connection driver needs: a pause/resume gate
//! for reads, a pause/resume gate for writes, and the upgrade handoff. The
//! driver itself is generic over any `tokio::io::AsyncRead + AsyncWrite`.

use std::cell::Cell;
use std::io;
use std::rc::Rc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

/// A binary gate the writer awaits before each substantial write
/// (`spec.md` §5 "Write" backpressure). Starts open.
#[derive(Clone)]
pub struct WriteGate {
    allowed: Rc<Cell<bool>>,
    notify: Rc<Notify>,
}

impl WriteGate {
    pub fn new() -> WriteGate {
        WriteGate { allowed: Rc::new(Cell::new(true)), notify: Rc::new(Notify::new()) }
    }

    pub fn pause_writing(&self) {
        self.allowed.set(false);
    }

    pub fn resume_writing(&self) {
        self.allowed.set(true);
        self.notify.notify_waiters();
    }

    /// The `throttle()` callback `spec.md` §4.D passes into body writers.
    pub async fn wait(&self) {
        while !self.allowed.get() {
            self.notify.notified().await;
        }
    }
}

impl Default for WriteGate {
    fn default() -> WriteGate {
        WriteGate::new()
    }
}

/// Tracks whether the connection's read loop should keep asking the socket
/// for more bytes (`spec.md` §5 "Read" backpressure — paused while a body
/// receiver's buffer is full, resumed by its `receive_paused` callback).
#[derive(Clone)]
pub struct ReadGate {
    allowed: Rc<Cell<bool>>,
    notify: Rc<Notify>,
}

impl ReadGate {
    pub fn new() -> ReadGate {
        ReadGate { allowed: Rc::new(Cell::new(true)), notify: Rc::new(Notify::new()) }
    }

    pub fn pause_reading(&self) {
        self.allowed.set(false);
    }

    pub fn resume_reading(&self) {
        self.allowed.set(true);
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        !self.allowed.get()
    }

    pub async fn wait_until_resumed(&self) {
        while !self.allowed.get() {
            self.notify.notified().await;
        }
    }
}

impl Default for ReadGate {
    fn default() -> ReadGate {
        ReadGate::new()
    }
}

/// Streams `len` bytes from `file` (positioned wherever the caller left it)
/// into `out` in 4 KiB chunks, awaiting `gate` before each chunk.
///
/// `spec.md` §4.D: "attempts a zero-copy send; on unsupported, falls back to
/// looped 4 KiB reads with a throttle per chunk." A real zero-copy
/// `sendfile(2)` dispatch needs a raw socket file descriptor, which belongs
/// to the listening-socket layer this crate treats as an external
/// collaborator (`spec.md` §1) — so this is always the fallback path here;
/// a production transport wired in by that collaborator is free to
/// intercept before calling this.
pub async fn send_file_fallback<W>(
    out: &mut W,
    file: &mut std::fs::File,
    mut len: u64,
    gate: &WriteGate,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    use std::io::Read;
    let mut chunk = [0u8; 4096];
    while len > 0 {
        gate.wait().await;
        let want = std::cmp::min(len, chunk.len() as u64) as usize;
        let n = file.read(&mut chunk[..want])?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n]).await?;
        len -= n as u64;
    }
    Ok(())
}
