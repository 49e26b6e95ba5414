//! Request handle: the caller-facing event stream for one request.
//!
//! Every request dispatch creates a handle before any I/O starts. The
//! background driver task forwards events through a bounded channel;
//! the handle is consumed either incrementally via [`next`] or driven
//! to completion via [`into_response`].
//!
//! [`next`]: RequestHandle::next
//! [`into_response`]: RequestHandle::into_response

use crate::error::{CouchLinkError, Result};
use crate::event_handlers::RequestInfo;
use crate::models::{Response, ResponseHead};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};

/// Default capacity for request event channels.
pub(crate) const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// One event in the per-request sequence
/// `request, response, (metadata?, row*)?, (end | error)`.
#[derive(Debug)]
pub enum RequestEvent {
    /// The request was dispatched.
    Request(RequestInfo),
    /// Response head received; body not yet consumed.
    Response(ResponseHead),
    /// View envelope (streamed requests only).
    Metadata(JsonValue),
    /// One view row (streamed requests only).
    Row(JsonValue),
    /// Terminal: the request succeeded. Carries the full envelope in
    /// buffered mode; in streaming mode the envelope has no body.
    End(Response),
    /// Terminal: the request failed.
    Error(CouchLinkError),
}

impl RequestEvent {
    /// True for `End` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End(_) | Self::Error(_))
    }
}

/// Consumer handle for a single request.
///
/// # Examples
///
/// ```rust,no_run
/// use couch_link::{CouchLinkClient, RequestEvent, RequestOptions};
///
/// # async fn example() -> couch_link::Result<()> {
/// let client = CouchLinkClient::builder()
///     .url("http://localhost:5984/contacts")
///     .build()?;
///
/// let mut handle = client.request(RequestOptions::get("_all_docs").streaming());
/// while let Some(event) = handle.next().await {
///     match event {
///         RequestEvent::Row(row) => println!("row: {}", row),
///         RequestEvent::Error(e) => eprintln!("failed: {}", e),
///         _ => {},
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RequestHandle {
    events: mpsc::Receiver<RequestEvent>,
    /// Signal the driver task to cancel. `None` once consumed.
    abort_tx: Option<oneshot::Sender<()>>,
    finished: bool,
}

impl RequestHandle {
    /// Wire up a handle: returns the driver-side sink and abort signal
    /// together with the caller-side handle.
    pub(crate) fn channel() -> (EventSink, oneshot::Receiver<()>, RequestHandle) {
        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let (abort_tx, abort_rx) = oneshot::channel();
        (
            EventSink {
                tx,
                terminal_sent: false,
            },
            abort_rx,
            RequestHandle {
                events: rx,
                abort_tx: Some(abort_tx),
                finished: false,
            },
        )
    }

    /// The next event, or `None` after the terminal event (or abort).
    pub async fn next(&mut self) -> Option<RequestEvent> {
        if self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            },
            None => {
                self.finished = true;
                None
            },
        }
    }

    /// Drive the event sequence to its terminal event and return the
    /// response envelope. Non-terminal events are discarded; use
    /// [`next`](Self::next) to observe streamed rows.
    pub async fn into_response(mut self) -> Result<Response> {
        while let Some(event) = self.next().await {
            match event {
                RequestEvent::End(response) => return Ok(response),
                RequestEvent::Error(err) => return Err(err),
                _ => {},
            }
        }
        Err(CouchLinkError::Aborted)
    }

    /// Cancel the in-flight request. Idempotent; no further events
    /// fire, and retries in progress are cancelled.
    pub fn abort(&mut self) {
        if let Some(tx) = self.abort_tx.take() {
            let _ = tx.send(());
        }
        self.finished = true;
    }
}

/// Driver-side sender enforcing the single-terminal-event contract.
pub(crate) struct EventSink {
    tx: mpsc::Sender<RequestEvent>,
    terminal_sent: bool,
}

impl EventSink {
    /// Forward an event. Returns `false` when the driver should stop:
    /// the receiver is gone or a terminal event was already sent.
    pub(crate) async fn emit(&mut self, event: RequestEvent) -> bool {
        if self.terminal_sent {
            return false;
        }
        if event.is_terminal() {
            self.terminal_sent = true;
        }
        self.tx.send(event).await.is_ok()
    }
}
