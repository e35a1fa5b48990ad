//! Streaming Session state machine
//!
//! One session per connection replays the transformed series at a fixed
//! cadence:
//!
//! ```text
//! Loading ──ok, non-empty──▶ Streaming ──cursor == len──▶ Draining ──▶ Closed
//!    │  └──ok, empty─────────────────────────────────────────────────▶ Closed
//!    └──load failed──▶ Aborted
//! any non-terminal state ──close signal──▶ Closed
//! ```
//!
//! The session owns its sequence snapshot, cursor, ticker and close signal.
//! Nothing is shared between sessions. The ticker lives inside `run`, so it
//! is released as soon as the session reaches a terminal state or the
//! future is dropped.

use async_trait::async_trait;
use ecg_common::{transform, SeriesStore, TransformedSample};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SERIES_UNAVAILABLE_MESSAGE;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Loading the series snapshot
    Loading,
    /// Emitting one sample per tick
    Streaming,
    /// Sequence exhausted, closing the connection
    Draining,
    /// Finished normally or closed by the client
    Closed,
    /// Series could not be loaded
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }
}

/// The transport went away while sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("connection closed")]
pub struct SinkClosed;

/// Outbound side of a streaming connection
#[async_trait]
pub trait SampleSink: Send {
    /// Deliver one sample frame
    async fn send_sample(&mut self, sample: &TransformedSample) -> Result<(), SinkClosed>;

    /// Deliver a single `{error: ...}` frame
    async fn send_error(&mut self, message: &str) -> Result<(), SinkClosed>;

    /// Close the connection from the server side
    async fn close(&mut self);
}

/// Final report of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub connection_id: Uuid,
    pub state: SessionState,
    /// Samples delivered before the session ended
    pub emitted: usize,
}

/// Per-connection replay of the transformed series
pub struct StreamingSession {
    connection_id: Uuid,
    store: SeriesStore,
    tick_interval: Duration,
    close_signal: CancellationToken,
    state: SessionState,
    sequence: Vec<TransformedSample>,
    cursor: usize,
}

impl StreamingSession {
    pub fn new(store: SeriesStore, tick_interval: Duration) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            store,
            tick_interval,
            close_signal: CancellationToken::new(),
            state: SessionState::Loading,
            sequence: Vec::new(),
            cursor: 0,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token the transport fires when the connection closes
    ///
    /// Cancelling it after the session has finished is a no-op.
    pub fn close_signal(&self) -> CancellationToken {
        self.close_signal.clone()
    }

    /// Drive the session to a terminal state
    pub async fn run<S: SampleSink + ?Sized>(mut self, sink: &mut S) -> SessionOutcome {
        info!(connection_id = %self.connection_id, "Streaming session started");

        while !self.state.is_terminal() {
            match self.state {
                SessionState::Loading => self.load(sink).await,
                SessionState::Streaming => self.stream(sink).await,
                SessionState::Draining => self.drain(sink).await,
                SessionState::Closed | SessionState::Aborted => break,
            }
        }

        info!(
            connection_id = %self.connection_id,
            state = ?self.state,
            emitted = self.cursor,
            "Streaming session ended"
        );

        SessionOutcome {
            connection_id: self.connection_id,
            state: self.state,
            emitted: self.cursor,
        }
    }

    fn transition_to(&mut self, new_state: SessionState) {
        debug!(
            connection_id = %self.connection_id,
            from = ?self.state,
            to = ?new_state,
            "Session state transition"
        );
        self.state = new_state;
    }

    async fn load<S: SampleSink + ?Sized>(&mut self, sink: &mut S) {
        let loaded = tokio::select! {
            biased;
            _ = self.close_signal.cancelled() => {
                self.transition_to(SessionState::Closed);
                return;
            }
            result = self.store.load() => result,
        };

        match loaded {
            Ok(series) => {
                self.sequence = transform(&series);
                self.cursor = 0;
                if self.sequence.is_empty() {
                    debug!(connection_id = %self.connection_id, "Empty series, nothing to stream");
                    sink.close().await;
                    self.transition_to(SessionState::Closed);
                } else {
                    debug!(
                        connection_id = %self.connection_id,
                        samples = self.sequence.len(),
                        "Series snapshot loaded"
                    );
                    self.transition_to(SessionState::Streaming);
                }
            }
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to load series for streaming session"
                );
                let _ = sink.send_error(SERIES_UNAVAILABLE_MESSAGE).await;
                sink.close().await;
                self.transition_to(SessionState::Aborted);
            }
        }
    }

    async fn stream<S: SampleSink + ?Sized>(&mut self, sink: &mut S) {
        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Close wins over a tick that became ready at the same time
                biased;
                _ = self.close_signal.cancelled() => {
                    debug!(
                        connection_id = %self.connection_id,
                        cursor = self.cursor,
                        "Connection closed mid-stream"
                    );
                    self.transition_to(SessionState::Closed);
                    return;
                }
                _ = ticker.tick() => {
                    if let Some(sample) = self.sequence.get(self.cursor) {
                        if sink.send_sample(sample).await.is_err() {
                            debug!(
                                connection_id = %self.connection_id,
                                cursor = self.cursor,
                                "Send failed, treating as connection close"
                            );
                            self.transition_to(SessionState::Closed);
                            return;
                        }
                        self.cursor += 1;
                    }
                    if self.cursor >= self.sequence.len() {
                        self.transition_to(SessionState::Draining);
                        return;
                    }
                }
            }
        }
    }

    async fn drain<S: SampleSink + ?Sized>(&mut self, sink: &mut S) {
        sink.close().await;
        self.transition_to(SessionState::Closed);
    }
}
