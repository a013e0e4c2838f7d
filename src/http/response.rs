//! Response bodies backed by a session.
//!
//! # Responsibilities
//! - Carry body chunks from behaviors to the connection through a bounded channel
//! - Turn a deliberate abort into a body error so hyper drops the connection
//! - Close the owning session when the body is dropped
//!
//! # Design Decisions
//! - The channel depth is the backpressure window: a full channel means the
//!   connection has not taken the previous chunks yet
//! - Ending and aborting travel through the same channel as data, so they are
//!   observed in the order behaviors issued them

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use hyper::body::{Body, Bytes, Frame, SizeHint};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::http::writer::{ChunkSink, SinkClosed, WriteStatus};
use crate::session::{CloseCause, Session};

#[derive(Debug)]
enum BodyEvent {
    Data(Bytes),
    End,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Open,
    /// Abort received; yield once so buffered bytes reach the socket first.
    Aborting,
    Done(CloseCause),
}

/// Response body that streams whatever the session's behavior produces.
pub struct SessionBody {
    rx: mpsc::Receiver<BodyEvent>,
    state: BodyState,
    session: Session,
    length: Option<u64>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl SessionBody {
    /// Open a streaming body with room for `depth` queued chunks.
    pub fn channel(mut session: Session, depth: usize) -> (ResponseChannel, Self) {
        session.streaming();
        let (tx, rx) = mpsc::channel(depth.max(1));
        let body = Self {
            rx,
            state: BodyState::Open,
            session,
            length: None,
            on_close: None,
        };
        (ResponseChannel { tx }, body)
    }

    /// A complete body holding `data`.
    pub fn full(session: Session, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        let (channel, body) = Self::channel(session, 2);
        if len > 0 {
            channel.send(BodyEvent::Data(data));
        }
        channel.end();
        body.with_length(len)
    }

    /// An empty, already complete body.
    pub fn empty(session: Session) -> Self {
        Self::full(session, Bytes::new())
    }

    /// Declare the exact number of bytes this body will produce.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Run `f` once the body is dropped, after the session has closed.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Body for SessionBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match this.state {
            BodyState::Done(_) => return Poll::Ready(None),
            BodyState::Aborting => {
                this.state = BodyState::Done(CloseCause::Aborted);
                return Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "session aborted the connection",
                ))));
            }
            BodyState::Open => {}
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(BodyEvent::Data(chunk)) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Some(BodyEvent::End) | None => {
                this.state = BodyState::Done(CloseCause::Completed);
                Poll::Ready(None)
            }
            Some(BodyEvent::Abort) => {
                this.state = BodyState::Aborting;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, BodyState::Done(_))
    }

    fn size_hint(&self) -> SizeHint {
        match self.length {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::default(),
        }
    }
}

impl Drop for SessionBody {
    fn drop(&mut self) {
        let cause = match self.state {
            BodyState::Done(cause) => cause,
            BodyState::Aborting => CloseCause::Aborted,
            BodyState::Open => CloseCause::OutboundClosed,
        };
        self.session.close(cause);
        if let Some(f) = self.on_close.take() {
            f();
        }
    }
}

/// Producer side of a [`SessionBody`].
///
/// Behaviors that write small lines from timers clone it freely. As a
/// [`ChunkSink`] it must be the only producer, so that a drained channel
/// really has room for the next chunk.
#[derive(Debug, Clone)]
pub struct ResponseChannel {
    tx: mpsc::Sender<BodyEvent>,
}

impl ResponseChannel {
    /// Queue a small chunk without waiting. Dropped if the peer is not reading.
    pub fn push(&self, data: impl Into<Bytes>) {
        self.send(BodyEvent::Data(data.into()));
    }

    /// Finish the body normally.
    pub fn end(&self) {
        self.send_control(BodyEvent::End);
    }

    /// Drop the connection once the chunks queued so far have been handed over.
    pub fn abort(&self) {
        self.send_control(BodyEvent::Abort);
    }

    /// Queue a last chunk, then finish the body normally.
    pub fn end_with(&self, data: impl Into<Bytes>) {
        self.send_final(data.into(), BodyEvent::End);
    }

    /// Queue a last chunk, then drop the connection once it has been handed over.
    pub fn abort_with(&self, data: impl Into<Bytes>) {
        self.send_final(data.into(), BodyEvent::Abort);
    }

    fn send(&self, event: BodyEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!(?event, "Response channel full, dropping chunk");
            }
        }
    }

    /// A final chunk and its terminator are never dropped and never reordered.
    fn send_final(&self, data: Bytes, terminal: BodyEvent) {
        match self.tx.try_send(BodyEvent::Data(data)) {
            Ok(()) => self.send_control(terminal),
            Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(data)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(data).await.is_ok() {
                        let _ = tx.send(terminal).await;
                    }
                });
            }
        }
    }

    /// End and abort must not be lost to a full channel; queue them behind the data.
    fn send_control(&self, event: BodyEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
        }
    }
}

impl ChunkSink for ResponseChannel {
    fn write(&mut self, chunk: Bytes) -> Result<WriteStatus, SinkClosed> {
        match self.tx.try_send(BodyEvent::Data(chunk)) {
            Ok(()) if self.tx.capacity() == 0 => Ok(WriteStatus::Backpressured),
            Ok(()) => Ok(WriteStatus::Ready),
            Err(TrySendError::Closed(_)) => Err(SinkClosed),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Chunk written while response channel was full");
                Err(SinkClosed)
            }
        }
    }

    async fn drained(&mut self) -> Result<(), SinkClosed> {
        // Reserving and releasing a slot proves the channel has room again.
        self.tx.reserve().await.map(drop).map_err(|_| SinkClosed)
    }

    fn finish(self) {
        self.end();
    }
}
