//! Per-request behavior dispatcher.
//!
//! # Responsibilities
//! - Select the behavior from the request target
//! - Fire the silent behaviors before the body is read
//! - Accumulate the body, then run the selected behavior
//! - Turn deliberate connection drops into a service error for hyper
//!
//! # Design Decisions
//! - A `DispatchError` is never a fault of the server: hyper answers it by
//!   closing the connection without writing a response, which is exactly
//!   what the silent behaviors want
//! - Large bodies are produced on a separate task through the chunked writer

use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use tokio::sync::oneshot;

use crate::behavior::checks::{self, APPLICATION_JSON, OCTET_STREAM, TEXT_PLAIN};
use crate::behavior::noisy::{self, Ending};
use crate::behavior::pages::{STOP_PAGE, WELCOME_PAGE};
use crate::behavior::{Behavior, Fixtures};
use crate::config::BehaviorConfig;
use crate::http::body::BodyAccumulator;
use crate::http::response::SessionBody;
use crate::http::writer::{ByteSource, ChunkedWriter, FixedSource, RandomSource};
use crate::lifecycle::ServerHandle;
use crate::observability::metrics;
use crate::session::{CloseCause, Session};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const TEXT_HTML: &str = "text/html";

/// Reasons a request ends without any response being written.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("connection rejected")]
    Rejected,

    #[error("connection timed out")]
    TimedOut,

    #[error("failed to read request body: {0}")]
    Inbound(#[source] BoxError),
}

/// Maps requests to behaviors and drives them.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<BehaviorConfig>,
    fixtures: Arc<Fixtures>,
    writer: ChunkedWriter,
    lifecycle: Option<ServerHandle>,
}

impl Dispatcher {
    pub fn new(config: Arc<BehaviorConfig>, fixtures: Arc<Fixtures>) -> Self {
        let writer = ChunkedWriter::new(config.chunk_size);
        Self {
            config,
            fixtures,
            writer,
            lifecycle: None,
        }
    }

    /// Let `/stop` reach the server that owns this dispatcher.
    pub fn with_lifecycle(mut self, handle: ServerHandle) -> Self {
        self.lifecycle = Some(handle);
        self
    }

    pub async fn dispatch<B>(&self, request: Request<B>) -> Result<Response<SessionBody>, DispatchError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let target = request.uri().path_and_query().map_or("/", |pq| pq.as_str());
        let behavior = Behavior::from_target(target);
        let mut session = Session::new(behavior);
        tracing::debug!(
            session = %session.id(),
            method = %request.method(),
            uri = %target,
            behavior = %behavior,
            "Dispatching request"
        );

        if behavior.fires_before_body() {
            return Err(self.drop_silently(session).await);
        }

        let (parts, body) = request.into_parts();
        let body = match BodyAccumulator::collect(body, &mut session).await {
            Ok(body) => body,
            Err(e) => {
                let e: BoxError = e.into();
                tracing::debug!(session = %session.id(), error = %e, "Inbound stream failed");
                session.close(CloseCause::InboundError);
                return Err(DispatchError::Inbound(e));
            }
        };

        let response = match behavior {
            Behavior::NoisyRejection => respond(
                StatusCode::OK,
                Some(TEXT_PLAIN),
                noisy::noisy(session, &self.config, Ending::Abort),
            ),
            Behavior::NoisyTimeout => respond(
                StatusCode::OK,
                Some(TEXT_PLAIN),
                noisy::noisy(session, &self.config, Ending::End),
            ),
            Behavior::BigRandomFile => {
                let size = self.config.big_file_size;
                let mut response = respond(
                    StatusCode::OK,
                    Some(OCTET_STREAM),
                    self.stream(session, RandomSource::new(size)),
                );
                response.headers_mut().insert(
                    CONTENT_DISPOSITION,
                    HeaderValue::from_static("attachment; filename=\"bigrandomfile.bin\""),
                );
                response
            }
            Behavior::CheckPattern => {
                if checks::check_pattern(&parts.method, &parts.headers, &body, &self.fixtures) {
                    respond(StatusCode::OK, Some(OCTET_STREAM), self.stream(session, FixedSource::new(body)))
                } else {
                    self.reject(session, None)
                }
            }
            Behavior::CheckString => {
                if checks::check_string(&parts.method, &parts.headers, &body, &self.fixtures) {
                    respond(StatusCode::OK, Some(TEXT_PLAIN), self.stream(session, FixedSource::new(body)))
                } else {
                    self.reject(session, None)
                }
            }
            Behavior::CheckJson => {
                match checks::check_json(&parts.method, &parts.headers, &body, &self.fixtures) {
                    Ok(()) => {
                        let canonical = self.fixtures.json_bytes().clone();
                        respond(
                            StatusCode::OK,
                            Some(APPLICATION_JSON),
                            self.stream(session, FixedSource::new(canonical)),
                        )
                    }
                    Err(rejection) => self.reject(session, Some(rejection.to_string())),
                }
            }
            Behavior::SilentResponse => respond(StatusCode::NO_CONTENT, None, SessionBody::empty(session)),
            Behavior::Stop => {
                let body = SessionBody::full(session, STOP_PAGE);
                let body = match self.lifecycle.clone() {
                    Some(handle) => body.on_close(move || request_stop(handle)),
                    None => body,
                };
                respond(StatusCode::OK, Some(TEXT_HTML), body)
            }
            Behavior::Welcome => respond(StatusCode::OK, Some(TEXT_HTML), SessionBody::full(session, WELCOME_PAGE)),
            // Already answered above, before the body was read.
            Behavior::SilentRejection | Behavior::SilentTimeout => return Err(self.drop_silently(session).await),
        };

        Ok(response)
    }

    /// Silent rejection and silent timeout: no response, ever.
    async fn drop_silently(&self, mut session: Session) -> DispatchError {
        let err = match session.behavior() {
            Behavior::SilentTimeout => {
                self.silent_timeout(&session).await;
                DispatchError::TimedOut
            }
            _ => DispatchError::Rejected,
        };
        session.close(CloseCause::Aborted);
        err
    }

    /// Wait out the silent timeout on a session timer.
    ///
    /// If the peer goes away first, the request future is dropped along with
    /// the session, which cancels the timer.
    async fn silent_timeout(&self, session: &Session) {
        let (tx, rx) = oneshot::channel();
        let delay = Duration::from_millis(self.config.silent_timeout_ms);
        session.timers().schedule_once(delay, move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    /// Stream `source` through the chunked writer on its own task.
    fn stream<S>(&self, session: Session, source: S) -> SessionBody
    where
        S: ByteSource + 'static,
    {
        let id = session.id();
        let behavior = session.behavior();
        let length = source.remaining();
        let (channel, body) = SessionBody::channel(session, self.config.buffered_chunks);
        let writer = self.writer;

        tokio::spawn(async move {
            match writer.write_all(source, channel).await {
                Ok(written) => {
                    metrics::record_bytes_streamed(behavior, written);
                    tracing::debug!(session = %id, behavior = %behavior, bytes = written, "Stream complete");
                }
                Err(e) => {
                    tracing::debug!(session = %id, behavior = %behavior, error = %e, "Stream cut short");
                }
            }
        });

        body.with_length(length)
    }

    fn reject(&self, session: Session, message: Option<String>) -> Response<SessionBody> {
        let behavior = session.behavior();
        metrics::record_validation_failure(behavior);
        tracing::debug!(
            session = %session.id(),
            behavior = %behavior,
            reason = message.as_deref().unwrap_or("payload mismatch"),
            "Validation failed"
        );
        match message {
            Some(message) => respond(StatusCode::BAD_REQUEST, Some(TEXT_PLAIN), SessionBody::full(session, message)),
            None => respond(StatusCode::BAD_REQUEST, None, SessionBody::empty(session)),
        }
    }
}

fn respond(status: StatusCode, content_type: Option<&'static str>, body: SessionBody) -> Response<SessionBody> {
    let length = body.size_hint().exact();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    if let Some(length) = length.filter(|_| status != StatusCode::NO_CONTENT) {
        response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

/// Called once the `/stop` response has been handed off.
fn request_stop(handle: ServerHandle) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        match handle.stop() {
            Some(Ok(pending)) => match pending.await {
                Ok(()) => tracing::info!("Server stopped by request"),
                Err(e) => tracing::warn!(error = %e, "Stop requested over HTTP failed"),
            },
            Some(Err(e)) => tracing::debug!(error = %e, "Stop requested over HTTP ignored"),
            None => {}
        }
    });
}
