//! Inbound body accumulation.
//!
//! Collects request body chunks in arrival order and freezes them into a
//! single buffer once the stream ends. There is no size cap: the check routes
//! must see multi-megabyte payloads whole.

use std::pin::pin;

use futures_util::future::poll_fn;
use hyper::body::{Body, Bytes};

use crate::session::Session;

/// Ordered buffer of inbound chunks.
#[derive(Debug, Default)]
pub struct BodyAccumulator {
    chunks: Vec<Bytes>,
    len: usize,
}

impl BodyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenate everything received so far.
    ///
    /// A body that arrived as one chunk is returned as-is; otherwise the
    /// chunks are copied once and released.
    pub fn finish(mut self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.pop().unwrap_or_default(),
            _ => {
                let mut buf = Vec::with_capacity(self.len);
                for chunk in self.chunks.drain(..) {
                    buf.extend_from_slice(&chunk);
                }
                Bytes::from(buf)
            }
        }
    }

    /// Read `body` to the end, reporting progress on `session`.
    pub async fn collect<B>(body: B, session: &mut Session) -> Result<Bytes, B::Error>
    where
        B: Body<Data = Bytes>,
    {
        let mut body = pin!(body);
        let mut acc = Self::new();
        while let Some(frame) = poll_fn(|cx| body.as_mut().poll_frame(cx)).await {
            // Trailers carry no body bytes.
            if let Ok(data) = frame?.into_data() {
                session.bytes_received(data.len());
                acc.push(data);
            }
        }
        session.body_complete(acc.len());
        Ok(acc.finish())
    }
}
