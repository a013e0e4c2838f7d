//! Backpressure-aware chunked writer.
//!
//! The single place large bodies are written from. A [`ByteSource`] hands out
//! chunks no larger than the configured size; a [`ChunkSink`] accepts them and
//! reports when its buffer is full, at which point the writer waits for
//! [`ChunkSink::drained`] before issuing the next write.

use std::future::Future;

use hyper::body::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Outcome of a single accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The sink can take more data right away.
    Ready,
    /// The chunk was taken but the sink is full; wait for drain.
    Backpressured,
}

/// The receiving side went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response stream closed")]
pub struct SinkClosed;

/// Outbound half of a response as seen by the writer.
pub trait ChunkSink {
    /// Hand one chunk to the transport. Must not be called while backpressured.
    fn write(&mut self, chunk: Bytes) -> Result<WriteStatus, SinkClosed>;

    /// Resolve once the transport can accept another chunk.
    fn drained(&mut self) -> impl Future<Output = Result<(), SinkClosed>> + Send;

    /// Mark the body complete.
    fn finish(self);
}

/// Supplier of the bytes to stream.
pub trait ByteSource: Send {
    /// Bytes still to be produced.
    fn remaining(&self) -> u64;

    /// Produce the next chunk of at most `max` bytes, or `None` when exhausted.
    fn next_chunk(&mut self, max: usize) -> Option<Bytes>;
}

/// Streams a fixed buffer without copying it.
#[derive(Debug, Clone)]
pub struct FixedSource {
    data: Bytes,
}

impl FixedSource {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }
}

impl ByteSource for FixedSource {
    fn remaining(&self) -> u64 {
        self.data.len() as u64
    }

    fn next_chunk(&mut self, max: usize) -> Option<Bytes> {
        if self.data.is_empty() {
            return None;
        }
        let len = max.min(self.data.len());
        Some(self.data.split_to(len))
    }
}

/// Generates fresh random bytes one chunk at a time.
pub struct RandomSource {
    remaining: u64,
    rng: StdRng,
}

impl RandomSource {
    pub fn new(total: u64) -> Self {
        Self {
            remaining: total,
            rng: StdRng::from_entropy(),
        }
    }
}

impl ByteSource for RandomSource {
    fn remaining(&self) -> u64 {
        self.remaining
    }

    fn next_chunk(&mut self, max: usize) -> Option<Bytes> {
        if self.remaining == 0 {
            return None;
        }
        let len = (max as u64).min(self.remaining) as usize;
        let mut buf = vec![0u8; len];
        self.rng.fill_bytes(&mut buf);
        self.remaining -= len as u64;
        Some(Bytes::from(buf))
    }
}

/// Writes a [`ByteSource`] into a [`ChunkSink`] in bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedWriter {
    chunk_size: usize,
}

impl ChunkedWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Drive `source` to completion, then finish the sink.
    ///
    /// Returns the number of bytes handed to the sink. On [`SinkClosed`] the
    /// sink is dropped unfinished and the remaining bytes are never produced.
    pub async fn write_all<S, B>(&self, mut source: B, mut sink: S) -> Result<u64, SinkClosed>
    where
        S: ChunkSink,
        B: ByteSource,
    {
        let mut written = 0u64;
        while let Some(chunk) = source.next_chunk(self.chunk_size) {
            written += chunk.len() as u64;
            match sink.write(chunk)? {
                WriteStatus::Ready => {
                    // Generating the next chunk is synchronous work; let other
                    // connections run in between.
                    tokio::task::yield_now().await;
                }
                WriteStatus::Backpressured => sink.drained().await?,
            }
        }
        sink.finish();
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records writes and reports backpressure on every `every`-th write.
    struct MockSink {
        log: Arc<Mutex<Vec<Event>>>,
        every: usize,
        writes: usize,
        blocked: bool,
        close_after: Option<usize>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Write(Bytes),
        Drain,
        Finish,
    }

    impl MockSink {
        fn new(every: usize) -> (Self, Arc<Mutex<Vec<Event>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let sink = Self {
                log: log.clone(),
                every,
                writes: 0,
                blocked: false,
                close_after: None,
            };
            (sink, log)
        }
    }

    impl ChunkSink for MockSink {
        fn write(&mut self, chunk: Bytes) -> Result<WriteStatus, SinkClosed> {
            assert!(!self.blocked, "write issued while backpressured");
            if self.close_after == Some(self.writes) {
                return Err(SinkClosed);
            }
            self.writes += 1;
            self.log.lock().unwrap().push(Event::Write(chunk));
            if self.every > 0 && self.writes % self.every == 0 {
                self.blocked = true;
                Ok(WriteStatus::Backpressured)
            } else {
                Ok(WriteStatus::Ready)
            }
        }

        async fn drained(&mut self) -> Result<(), SinkClosed> {
            tokio::task::yield_now().await;
            self.blocked = false;
            self.log.lock().unwrap().push(Event::Drain);
            Ok(())
        }

        fn finish(self) {
            self.log.lock().unwrap().push(Event::Finish);
        }
    }

    fn written_bytes(log: &[Event]) -> Vec<u8> {
        log.iter()
            .filter_map(|e| match e {
                Event::Write(b) => Some(b.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn fixed_source_is_chunked_in_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (sink, log) = MockSink::new(0);

        let written = ChunkedWriter::new(64)
            .write_all(FixedSource::new(Bytes::from(data.clone())), sink)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(written, 1000);
        assert_eq!(written_bytes(&log), data);
        assert_eq!(log.last(), Some(&Event::Finish));
        let sizes: Vec<usize> = log
            .iter()
            .filter_map(|e| match e {
                Event::Write(b) => Some(b.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes.len(), 16);
        assert!(sizes[..15].iter().all(|&s| s == 64));
        assert_eq!(sizes[15], 1000 - 15 * 64);
    }

    #[tokio::test]
    async fn waits_for_drain_after_backpressure() {
        let data = Bytes::from(vec![7u8; 500]);
        let (sink, log) = MockSink::new(2);

        ChunkedWriter::new(100)
            .write_all(FixedSource::new(data.clone()), sink)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        // Every second write is followed by a drain before the next write.
        let kinds: Vec<&str> = log
            .iter()
            .map(|e| match e {
                Event::Write(_) => "w",
                Event::Drain => "d",
                Event::Finish => "f",
            })
            .collect();
        assert_eq!(kinds, ["w", "w", "d", "w", "w", "d", "w", "f"]);
        assert_eq!(written_bytes(&log), data.to_vec());
    }

    #[tokio::test]
    async fn stops_when_sink_closes() {
        let (mut sink, log) = MockSink::new(0);
        sink.close_after = Some(2);

        let result = ChunkedWriter::new(10)
            .write_all(RandomSource::new(1_000), sink)
            .await;

        assert_eq!(result, Err(SinkClosed));
        let log = log.lock().unwrap();
        assert_eq!(written_bytes(&log).len(), 20);
        assert!(!log.contains(&Event::Finish));
    }

    #[test]
    fn random_source_produces_exact_total() {
        let mut source = RandomSource::new(250);
        let mut total = 0;
        while let Some(chunk) = source.next_chunk(100) {
            assert!(chunk.len() <= 100);
            total += chunk.len();
        }
        assert_eq!(total, 250);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn empty_fixed_source() {
        let mut source = FixedSource::new(Bytes::new());
        assert_eq!(source.remaining(), 0);
        assert!(source.next_chunk(10).is_none());
    }
}
