//! Response body strategies (`spec.md` §4.D): `Empty` / `Static` / `File` /
//! `Chunked`. Grounded on `examples/original_source/oahttp/response.py`'s
//! `EmptyResponseBody` / `StaticBody` / `FileBody` / `ChunkedBody`.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::chunked::{encode_chunk, encode_last_chunk};
use crate::headers::HeaderMap;
use crate::transport::{send_file_fallback, WriteGate};

/// An asynchronous source of body chunks for [`ResponseBody::Chunked`].
/// Boxed-future return keeps this object-safe so `Response` can hold
/// `Box<dyn ChunkSource>` without knowing the concrete generator type.
pub trait ChunkSource {
    fn next_chunk<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Option<Vec<u8>>> + 'a>>;
}

/// Adapts any `FnMut() -> Option<Vec<u8>>`-shaped async closure state into a
/// [`ChunkSource`]; handlers that already have an iterator of owned chunks
/// can use [`IterChunkSource`] instead of implementing the trait by hand.
pub struct IterChunkSource<I> {
    iter: I,
}

impl<I: Iterator<Item = Vec<u8>>> IterChunkSource<I> {
    pub fn new(iter: I) -> IterChunkSource<I> {
        IterChunkSource { iter }
    }
}

impl<I: Iterator<Item = Vec<u8>>> ChunkSource for IterChunkSource<I> {
    fn next_chunk<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Option<Vec<u8>>> + 'a>> {
        Box::pin(async move { self.iter.next() })
    }
}

pub enum ResponseBody {
    Empty,
    Static(Vec<u8>),
    File { file: std::fs::File, len: u64 },
    Chunked(Box<dyn ChunkSource>),
}

fn set_default_content_type(headers: &mut HeaderMap) {
    if !headers.contains("content-type") {
        headers.set("content-type", "application/octet-stream");
    }
}

impl ResponseBody {
    /// Sets the framing headers implied by this body (`content-length` or
    /// `transfer-encoding: chunked`, and a default `content-type` if the
    /// caller didn't set one), per `spec.md` §4.D step 2. The default
    /// mirrors `response.py`'s fallback (`StaticBody`/`FileBody`/
    /// `ChunkedBody` all default to `application/octet-stream` absent a
    /// mime guess).
    pub fn set_framing_headers(&self, headers: &mut HeaderMap) {
        match self {
            ResponseBody::Empty => {}
            ResponseBody::Static(data) => {
                headers.set("content-length", data.len().to_string());
                set_default_content_type(headers);
            }
            ResponseBody::File { len, .. } => {
                headers.set("content-length", len.to_string());
                set_default_content_type(headers);
            }
            ResponseBody::Chunked(_) => {
                headers.set("transfer-encoding", "chunked");
                set_default_content_type(headers);
            }
        }
    }

    /// Writes the payload, awaiting `gate` before each substantial write
    /// (`spec.md` §4.D step 4).
    pub async fn write_to<W>(self, out: &mut W, gate: &WriteGate) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            ResponseBody::Empty => Ok(()),
            ResponseBody::Static(data) => {
                if data.is_empty() {
                    return Ok(());
                }
                gate.wait().await;
                out.write_all(&data).await
            }
            ResponseBody::File { mut file, len } => send_file_fallback(out, &mut file, len, gate).await,
            ResponseBody::Chunked(mut source) => {
                loop {
                    match source.next_chunk().await {
                        Some(chunk) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            let mut framed = Vec::with_capacity(chunk.len() + 16);
                            encode_chunk(&mut framed, &chunk);
                            gate.wait().await;
                            out.write_all(&framed).await?;
                        }
                        None => {
                            let mut last = Vec::new();
                            encode_last_chunk(&mut last);
                            gate.wait().await;
                            return out.write_all(&last).await;
                        }
                    }
                }
            }
        }
    }
}
