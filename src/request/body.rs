//! Body receivers: `Empty` / `Fixed(n)` / `Chunked` / `Spill` (`spec.md`
//! §3 "RequestBody variants", §4.C).
//!
//! Grounded on `examples/original_source/oahttp/request.py`'s
//! `NoRequestBody` / `BodyReceiver` / `BodyFileReceiver` /
//! `ChunkedBodyReceiver`. The connection driver feeds bytes into a body via
//! [`RequestBody::receive_data`] from its own read loop while a dispatch
//! task (running on the same thread, via `tokio::task::spawn_local`) calls
//! [`RequestBody::wait`] / [`RequestBody::read`] / [`RequestBody::open`] —
//! hence the `Rc<RefCell<..>>` sharing rather than `Arc<Mutex<..>>`: this
//! crate's connection is pinned to one OS thread (`spec.md` §5 "single-
//! threaded cooperative per event loop"), so there is no genuine
//! cross-thread race to guard against.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use tokio::sync::Notify;

use crate::chunked::parse_chunk_size_line;
use crate::error::Error;
use crate::headers::HeaderMap;

/// Backing store for a spilling receiver: starts in memory, migrates to a
/// temp file once `threshold` bytes have been written.
enum Backing {
    Memory(Vec<u8>),
    File(File),
}

impl Backing {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Backing::Memory(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            Backing::File(f) => f.write_all(data),
        }
    }

    fn len(&self) -> io::Result<u64> {
        match self {
            Backing::Memory(buf) => Ok(buf.len() as u64),
            Backing::File(f) => f.metadata().map(|m| m.len()),
        }
    }
}

/// A readable view of a drained [`Spill`], positioned at the start.
pub enum SpillReader {
    Memory(io::Cursor<Vec<u8>>),
    File(File),
}

impl Read for SpillReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match self {
            SpillReader::Memory(c) => c.read(out),
            SpillReader::File(f) => f.read(out),
        }
    }
}

/// A backing store that begins as an in-memory buffer and transparently
/// migrates to a temporary file once it exceeds `threshold` bytes.
///
/// Migration is a blocking filesystem call, matching the original's use of
/// `tempfile.SpooledTemporaryFile`: the data volumes that justify spilling
/// at all are assumed large enough that the cost of one file creation is
/// noise, so we don't plumb this through the async executor.
pub struct Spill {
    backing: Backing,
    threshold: usize,
}

impl Spill {
    pub fn new(threshold: usize) -> Spill {
        Spill { backing: Backing::Memory(Vec::new()), threshold }
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if let Backing::Memory(buf) = &self.backing {
            if buf.len() + data.len() > self.threshold {
                let mut file = new_temp_file()?;
                file.write_all(buf)?;
                self.backing = Backing::File(file);
            }
        }
        self.backing.write(data)
    }

    pub fn len(&self) -> u64 {
        self.backing.len().unwrap_or(0)
    }

    /// Returns a reader positioned at the start of the spilled data.
    pub fn open(&mut self) -> io::Result<SpillReader> {
        match &mut self.backing {
            Backing::Memory(buf) => Ok(SpillReader::Memory(io::Cursor::new(buf.clone()))),
            Backing::File(f) => {
                let mut dup = f.try_clone()?;
                dup.seek(SeekFrom::Start(0))?;
                Ok(SpillReader::File(dup))
            }
        }
    }
}

fn new_temp_file() -> io::Result<File> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("originhttp-body-{}-{}", std::process::id(), unique));
    let file = File::options().read(true).write(true).create(true).truncate(true).open(&path)?;
    // Best-effort: on unix this keeps the fd valid after removal and
    // guarantees cleanup even on abnormal exit. On platforms where removing
    // an open file fails, the OS temp directory still gets swept eventually.
    let _ = std::fs::remove_file(&path);
    Ok(file)
}

enum ChunkState {
    SizeLine,
    Data { remaining: u64 },
    PostChunkCrlf,
    Trailers,
    Done,
}

struct ChunkedInner {
    state: ChunkState,
    trailers: HeaderMap,
}

enum Kind {
    Empty,
    Fixed { remaining: u64 },
    Spill { remaining: u64 },
    Chunked(ChunkedInner),
}

struct Inner {
    kind: Kind,
    store: Spill,
    ready: bool,
    resume: Option<Box<dyn FnOnce()>>,
}

/// A request body receiver. Cheap to clone (shares the underlying state).
#[derive(Clone)]
pub struct RequestBody {
    inner: Rc<RefCell<Inner>>,
    notify: Rc<Notify>,
}

impl RequestBody {
    pub fn empty() -> RequestBody {
        RequestBody::new(Kind::Empty, 0, true)
    }

    pub fn fixed(len: u64, spill_threshold: usize) -> RequestBody {
        let ready = len == 0;
        if (len as usize) <= spill_threshold {
            RequestBody::new(Kind::Fixed { remaining: len }, spill_threshold, ready)
        } else {
            RequestBody::new(Kind::Spill { remaining: len }, spill_threshold, ready)
        }
    }

    pub fn chunked(spill_threshold: usize) -> RequestBody {
        RequestBody::new(
            Kind::Chunked(ChunkedInner { state: ChunkState::SizeLine, trailers: HeaderMap::new() }),
            spill_threshold,
            false,
        )
    }

    fn new(kind: Kind, spill_threshold: usize, ready: bool) -> RequestBody {
        RequestBody {
            inner: Rc::new(RefCell::new(Inner {
                kind,
                store: Spill::new(spill_threshold),
                ready,
                resume: None,
            })),
            notify: Rc::new(Notify::new()),
        }
    }

    pub fn ready(&self) -> bool {
        self.inner.borrow().ready
    }

    /// Suspends until the body is fully received.
    pub async fn wait(&self) {
        loop {
            if self.inner.borrow().ready {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Registers a callback the body invokes (synchronously, as soon as it
    /// becomes ready) so the transport resumes reading (`spec.md` §4.C
    /// "Backpressure").
    pub fn receive_paused(&self, resume: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.ready {
            drop(inner);
            resume();
        } else {
            inner.resume = Some(Box::new(resume));
        }
    }

    fn mark_ready(inner: &mut Inner) {
        inner.ready = true;
        if let Some(resume) = inner.resume.take() {
            resume();
        }
    }

    /// Feeds bytes arriving on the connection's line-oriented parse loop.
    /// Non-chunked bodies consume from `buf` directly (length-prefixed);
    /// chunked bodies drive the sub-state machine one line/slice at a time.
    /// Returns once `buf` is exhausted or the body becomes ready.
    pub fn receive_data(
        &self,
        buf: &mut crate::buffer::ReadBuffer,
        max_line_length: usize,
    ) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        if inner.ready {
            return Ok(());
        }
        loop {
            enum Step {
                Empty,
                LengthBound { remaining: u64 },
                Chunked,
            }
            let step = match &inner.kind {
                Kind::Empty => Step::Empty,
                Kind::Fixed { remaining } | Kind::Spill { remaining } => {
                    Step::LengthBound { remaining: *remaining }
                }
                Kind::Chunked(_) => Step::Chunked,
            };
            match step {
                Step::Empty => {
                    RequestBody::mark_ready(&mut inner);
                    break;
                }
                Step::LengthBound { remaining } => {
                    if remaining == 0 {
                        RequestBody::mark_ready(&mut inner);
                        break;
                    }
                    let want = std::cmp::min(remaining, buf.remaining_len() as u64) as usize;
                    if want == 0 {
                        break;
                    }
                    let data = buf.read(Some(want));
                    inner.store.write(data).map_err(Error::Io)?;
                    let left = remaining - want as u64;
                    match &mut inner.kind {
                        Kind::Fixed { remaining } | Kind::Spill { remaining } => *remaining = left,
                        _ => unreachable!(),
                    }
                    if left == 0 {
                        RequestBody::mark_ready(&mut inner);
                        break;
                    }
                    if buf.empty() {
                        break;
                    }
                }
                Step::Chunked => {
                    if !RequestBody::drive_chunked(&mut inner, buf, max_line_length)? {
                        break;
                    }
                    let done = matches!(&inner.kind, Kind::Chunked(c) if matches!(c.state, ChunkState::Done));
                    if done {
                        RequestBody::mark_ready(&mut inner);
                        break;
                    }
                }
            }
        }
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Advances the chunked sub-state machine by as much as `buf` allows.
    /// Returns `Ok(true)` if it should be called again (more to do and the
    /// buffer might still have bytes), `Ok(false)` if `buf` is exhausted.
    fn drive_chunked(
        inner: &mut Inner,
        buf: &mut crate::buffer::ReadBuffer,
        max_line_length: usize,
    ) -> Result<bool, Error> {
        enum Step {
            WantLine,
            Data { remaining: u64 },
            PostCrlf,
            TrailerLine,
        }
        let step = match &inner.kind {
            Kind::Chunked(c) => match c.state {
                ChunkState::SizeLine => Step::WantLine,
                ChunkState::Data { remaining } => Step::Data { remaining },
                ChunkState::PostChunkCrlf => Step::PostCrlf,
                ChunkState::Trailers => Step::TrailerLine,
                ChunkState::Done => return Ok(false),
            },
            _ => unreachable!(),
        };
        fn chunked(inner: &mut Inner) -> &mut ChunkedInner {
            match &mut inner.kind {
                Kind::Chunked(c) => c,
                _ => unreachable!(),
            }
        }
        match step {
            Step::WantLine => match buf.read_line(max_line_length)? {
                None => Ok(false),
                Some(line) => {
                    let size = parse_chunk_size_line(line)?;
                    chunked(inner).state =
                        if size == 0 { ChunkState::Trailers } else { ChunkState::Data { remaining: size } };
                    Ok(true)
                }
            },
            Step::Data { remaining } => {
                if buf.empty() {
                    return Ok(false);
                }
                let want = std::cmp::min(remaining, buf.remaining_len() as u64) as usize;
                let data = buf.read(Some(want));
                inner.store.write(data).map_err(Error::Io)?;
                let left = remaining - want as u64;
                chunked(inner).state =
                    if left == 0 { ChunkState::PostChunkCrlf } else { ChunkState::Data { remaining: left } };
                Ok(true)
            }
            Step::PostCrlf => match buf.read_line(max_line_length)? {
                None => Ok(false),
                Some(line) => {
                    if !line.is_empty() {
                        return Err(Error::Syntax("expected CRLF after chunk data"));
                    }
                    chunked(inner).state = ChunkState::SizeLine;
                    Ok(true)
                }
            },
            Step::TrailerLine => match buf.read_line(max_line_length)? {
                None => Ok(false),
                Some(line) => {
                    if line.is_empty() {
                        chunked(inner).state = ChunkState::Done;
                    } else {
                        let (name, value) = crate::headers::parse_header_line(line)?;
                        chunked(inner).trailers.append(name, value);
                    }
                    Ok(true)
                }
            },
        }
    }

    /// Trailer headers collected after the terminating chunk. Kept separate
    /// from the request's own header map (`spec.md` §9 open question).
    pub fn trailers(&self) -> HeaderMap {
        match &self.inner.borrow().kind {
            Kind::Chunked(c) => c.trailers.clone(),
            _ => HeaderMap::new(),
        }
    }

    /// Materialises the whole body into an owned buffer. Only meaningful
    /// after `wait()` has returned.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        let mut reader = self.inner.borrow_mut().store.open()?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    /// A readable stream over the received body, for handlers that want to
    /// avoid materialising everything at once.
    pub fn open(&self) -> io::Result<SpillReader> {
        self.inner.borrow_mut().store.open()
    }

    pub fn close(&self) {
        // Backing storage (memory Vec or a removed-but-open temp file) is
        // released when the last `Rc<RefCell<Inner>>` clone drops.
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::ReadBuffer;

    fn feed(buf: &mut ReadBuffer, data: &[u8]) {
        let n = data.len();
        let region = buf.writable_region(n).unwrap();
        region[..n].copy_from_slice(data);
        buf.wrote(n);
    }

    #[test]
    fn fixed_completes_after_exact_length_regardless_of_chunking() {
        for split in [1usize, 3, 11] {
            let body = RequestBody::fixed(11, 1 << 16);
            let mut buf = ReadBuffer::new(64);
            let payload = b"hello world";
            for chunk in payload.chunks(split) {
                feed(&mut buf, chunk);
                body.receive_data(&mut buf, 1024).unwrap();
            }
            assert!(body.ready());
            assert_eq!(body.read().unwrap(), payload);
        }
    }

    #[test]
    fn empty_body_is_ready_immediately() {
        let body = RequestBody::empty();
        assert!(body.ready());
        assert_eq!(body.read().unwrap(), b"");
    }

    #[test]
    fn chunked_reassembles_payload_and_trailers() {
        let body = RequestBody::chunked(1 << 16);
        let mut buf = ReadBuffer::new(256);
        feed(&mut buf, b"5\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: v\r\n\r\n");
        body.receive_data(&mut buf, 1024).unwrap();
        assert!(body.ready());
        assert_eq!(body.read().unwrap(), b"hello world");
        assert_eq!(body.trailers().get_combined("x-trailer"), Some("v".to_string()));
    }

    #[test]
    fn spill_migrates_past_threshold() {
        let body = RequestBody::fixed(20, 8);
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, &[b'x'; 20]);
        body.receive_data(&mut buf, 1024).unwrap();
        assert!(body.ready());
        assert_eq!(body.read().unwrap(), vec![b'x'; 20]);
    }

    #[test]
    fn receive_paused_resume_runs_once_ready() {
        let body = RequestBody::fixed(3, 1 << 16);
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        body.receive_paused(move || *fired2.borrow_mut() = true);
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, b"abc");
        body.receive_data(&mut buf, 1024).unwrap();
        assert!(*fired.borrow());
    }
}
