//! A fixed-capacity sliding byte buffer with line scanning.
//!
//! This is the single receive buffer for one connection. The transport
//! writes into the slice returned by [`ReadBuffer::writable_region`] and
//! reports how much it wrote via [`ReadBuffer::wrote`]; the parser then
//! consumes bytes from the front with [`ReadBuffer::read_line`] and
//! [`ReadBuffer::read`]. All reads return borrowed views: they are only
//! valid until the next write or realignment.

use crate::error::Error;

/// Sliding byte buffer with three cursors: `pos` (next unread byte),
/// `until` (next unwritten byte) and `pos_line` (scan hint for the next
/// newline search). Invariant: `0 <= pos <= pos_line <= until <= capacity`.
pub struct ReadBuffer {
    buf: Box<[u8]>,
    pos: usize,
    pos_line: usize,
    until: usize,
}

impl ReadBuffer {
    /// Creates a new buffer. `capacity` must exceed 9 bytes (a buffer that
    /// small cannot hold even the shortest possible request line).
    pub fn new(capacity: usize) -> ReadBuffer {
        assert!(capacity > 9, "buffer too small");
        ReadBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            pos: 0,
            pos_line: 0,
            until: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// True when there is nothing left to read.
    pub fn empty(&self) -> bool {
        self.pos == self.until
    }

    /// True when the buffer cannot make progress: no bytes consumed and no
    /// room to write more.
    pub fn full(&self) -> bool {
        self.pos == 0 && self.until == self.buf.len()
    }

    /// Returns a writable tail slice of at least `min(size_hint, capacity/4)`
    /// bytes, realigning the buffer first if necessary.
    ///
    /// # Errors
    /// [`Error::BufferFull`] if the buffer is full and cannot be realigned.
    pub fn writable_region(&mut self, size_hint: usize) -> Result<&mut [u8], Error> {
        let total = self.buf.len();
        let size_hint = if size_hint == 0 || size_hint >= total {
            total / 4
        } else {
            size_hint
        };
        if self.until + size_hint > total {
            if self.pos > 0 {
                self.buf.copy_within(self.pos..self.until, 0);
                self.until -= self.pos;
                self.pos = 0;
                self.pos_line = 0;
            } else if self.until >= total {
                return Err(Error::BufferFull);
            }
        }
        Ok(&mut self.buf[self.until..])
    }

    /// Must be called after a successful external write into the slice
    /// returned by `writable_region`, with the number of bytes written.
    pub fn wrote(&mut self, n: usize) {
        self.until += n;
        debug_assert!(self.until <= self.buf.len());
    }

    /// Scans for a line terminated by `LF` within
    /// `[pos_line, min(pos+limit, until))`.
    ///
    /// Returns `Ok(None)` when no newline has arrived yet (and remembers the
    /// scan position so the next call doesn't rescan already-checked bytes).
    /// Returns `Err(LimitExceeded)` when `limit` bytes were scanned without a
    /// newline. On a hit, returns the line with a trailing `CR` trimmed.
    pub fn read_line(&mut self, limit: usize) -> Result<Option<&[u8]>, Error> {
        let scan_end = std::cmp::min(self.pos.saturating_add(limit), self.until);
        let lf = memchr(b'\n', &self.buf[self.pos_line..scan_end]).map(|i| self.pos_line + i);
        match lf {
            None => {
                if scan_end != self.until {
                    return Err(Error::LimitExceeded);
                }
                self.pos_line = std::cmp::max(self.pos, self.until.saturating_sub(1));
                Ok(None)
            }
            Some(lf) => {
                let start = self.pos;
                let mut end = lf;
                if end > start && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }
                self.pos = lf + 1;
                self.pos_line = self.pos;
                Ok(Some(&self.buf[start..end]))
            }
        }
    }

    /// Consumes and returns up to `n` bytes (or all buffered bytes, if `n`
    /// is `None`).
    pub fn read(&mut self, n: Option<usize>) -> &[u8] {
        let available = self.until - self.pos;
        let count = match n {
            Some(n) if n < available => n,
            _ => available,
        };
        let start = self.pos;
        self.pos += count;
        self.pos_line = self.pos;
        &self.buf[start..start + count]
    }

    /// A view of everything currently buffered but not yet consumed.
    pub fn remaining_view(&self) -> &[u8] {
        &self.buf[self.pos..self.until]
    }

    pub fn remaining_len(&self) -> usize {
        self.until - self.pos
    }
}

fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

#[cfg(test)]
mod test {
    use super::ReadBuffer;

    fn feed(buf: &mut ReadBuffer, data: &[u8]) {
        let n = data.len();
        let region = buf.writable_region(n).unwrap();
        region[..n].copy_from_slice(data);
        buf.wrote(n);
    }

    #[test]
    fn read_line_whole() {
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, b"GET / HTTP/1.1\r\n");
        let line = buf.read_line(1024).unwrap().unwrap();
        assert_eq!(line, b"GET / HTTP/1.1");
    }

    #[test]
    fn read_line_bare_lf() {
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, b"GET / HTTP/1.1\n");
        let line = buf.read_line(1024).unwrap().unwrap();
        assert_eq!(line, b"GET / HTTP/1.1");
    }

    #[test]
    fn read_line_incremental_matches_whole() {
        let whole_input: &[u8] = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n";

        let mut whole = ReadBuffer::new(128);
        feed(&mut whole, whole_input);
        let mut whole_lines = Vec::new();
        while let Ok(Some(line)) = whole.read_line(1024) {
            whole_lines.push(line.to_vec());
        }

        let mut incremental = ReadBuffer::new(128);
        let mut incr_lines = Vec::new();
        for &byte in whole_input {
            feed(&mut incremental, &[byte]);
            while let Some(line) = incremental.read_line(1024).unwrap() {
                incr_lines.push(line.to_vec());
            }
        }

        assert_eq!(whole_lines, incr_lines);
    }

    #[test]
    fn read_line_none_until_newline() {
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, b"partial");
        assert_eq!(buf.read_line(1024).unwrap(), None);
        feed(&mut buf, b" line\r\n");
        assert_eq!(buf.read_line(1024).unwrap(), Some(&b"partial line"[..]));
    }

    #[test]
    fn read_line_limit_exceeded() {
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, b"0123456789");
        assert!(buf.read_line(5).is_err());
    }

    #[test]
    fn realignment_preserves_bytes_and_resets_cursors() {
        let mut buf = ReadBuffer::new(16);
        feed(&mut buf, b"0123456789");
        let _ = buf.read(Some(8));
        // forces a realignment since until(10) + 8 > capacity(16) and pos > 0
        feed(&mut buf, b"ABCDEFGH");
        assert_eq!(buf.remaining_view(), b"89ABCDEFGH");
    }

    #[test]
    fn full_buffer_rejects_write_when_no_progress_possible() {
        let mut buf = ReadBuffer::new(16);
        feed(&mut buf, &[b'x'; 16]);
        assert!(buf.full());
        assert!(buf.writable_region(1).is_err());
    }

    #[test]
    fn read_consumes_logical_stream_exactly() {
        let mut buf = ReadBuffer::new(64);
        feed(&mut buf, b"hello world");
        let mut out = Vec::new();
        out.extend_from_slice(buf.read(Some(5)));
        out.extend_from_slice(buf.read(None));
        assert_eq!(out, b"hello world");
    }
}
