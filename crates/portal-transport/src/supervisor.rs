//! Connection supervisor: one task per connect request. It opens the
//! connection, drives it, and on an unexpected drop waits the reconnect
//! delay before trying again, for as long as a connection is requested.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use portal_core::outbound;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::connector::{Connection, FrameSink};
use crate::error::TransportError;
use crate::events::{ConnectionState, TransportEvent};
use crate::transport::{Parting, Shared};

enum Outcome {
    /// `close()` was called.
    Closed,
    /// The inactivity limit was reached.
    Suspended,
    Lost(TransportError),
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
    parting: Parting,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    supervise(&shared, generation, &cancel, &parting).await;

    // Closed before the connection could write them: back to the queue.
    let unsent = std::mem::take(&mut *parting.lock());
    restore(&shared, unsent);
    {
        let mut state = shared.state.lock();
        if state.generation == generation {
            state.run = None;
            state.connection = ConnectionState::Disconnected;
        }
    }
    shared.emit(TransportEvent::Closed);
}

async fn supervise(shared: &Shared, generation: u64, cancel: &CancellationToken, parting: &Parting) {
    let mut was_open = false;

    loop {
        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            attempt = shared.connector.connect(&shared.endpoint) => attempt,
        };

        match attempt {
            Ok(connection) => {
                if !mark_open(shared, generation) {
                    break;
                }
                tracing::info!(endpoint = %shared.endpoint, "connection open");
                shared.emit(if was_open {
                    TransportEvent::ConnectionRestored
                } else {
                    TransportEvent::Connected
                });
                was_open = true;

                match drive(shared, generation, cancel, parting, connection).await {
                    Outcome::Closed | Outcome::Suspended => break,
                    Outcome::Lost(error) => {
                        tracing::warn!(
                            endpoint = %shared.endpoint,
                            error = %error,
                            error_kind = error.error_kind(),
                            "connection lost"
                        );
                        shared.emit(TransportEvent::ConnectionLost);
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    endpoint = %shared.endpoint,
                    error = %error,
                    error_kind = error.error_kind(),
                    "connect failed"
                );
            }
        }

        if !mark(shared, generation, ConnectionState::Disconnected) {
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = time::sleep(shared.config.reconnect_delay) => {}
        }
        if !mark(shared, generation, ConnectionState::Connecting) {
            break;
        }
        tracing::debug!(endpoint = %shared.endpoint, "reconnecting");
    }
}

/// Record a state transition. `false` when this supervisor was superseded
/// or the connection is no longer wanted.
fn mark(shared: &Shared, generation: u64, connection: ConnectionState) -> bool {
    let mut state = shared.state.lock();
    if state.generation != generation || !state.connect_requested {
        return false;
    }
    state.connection = connection;
    true
}

fn mark_open(shared: &Shared, generation: u64) -> bool {
    let mut state = shared.state.lock();
    if state.generation != generation || !state.connect_requested {
        return false;
    }
    state.connection = ConnectionState::Open;
    state.idle = std::time::Duration::ZERO;
    state.sent_since_tick = false;
    true
}

async fn drive(
    shared: &Shared,
    generation: u64,
    cancel: &CancellationToken,
    parting: &Parting,
    connection: Connection,
) -> Outcome {
    let Connection {
        mut sink,
        mut stream,
    } = connection;

    let period = shared.config.keep_alive_interval;
    let mut keep_alive = time::interval_at(Instant::now() + period, period);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if let Err(error) = flush(shared, generation, parting, &mut sink).await {
            return Outcome::Lost(error);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                finish(shared, parting, &mut sink).await;
                return Outcome::Closed;
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => shared.receive(&text),
                Some(Err(error)) => return Outcome::Lost(error),
                None => return Outcome::Lost(TransportError::ConnectionClosed),
            },
            () = shared.outbound_ready.notified() => {}
            _ = keep_alive.tick() => {
                if keep_alive_tick(shared, generation) {
                    let _ = sink.close().await;
                    return Outcome::Suspended;
                }
            }
        }
    }
}

/// Write queued frames head first. A frame whose write fails goes back to
/// the head of the queue that now owns it: the shared queue, or the parting
/// frames if `close` ran meanwhile.
async fn flush(
    shared: &Shared,
    generation: u64,
    parting: &Parting,
    sink: &mut FrameSink,
) -> Result<(), TransportError> {
    loop {
        let frame = {
            let mut state = shared.state.lock();
            if state.generation != generation {
                return Ok(());
            }
            match state.outbound.pop_front() {
                Some(frame) => frame,
                None => return Ok(()),
            }
        };
        if let Err(error) = sink.send(frame.clone()).await {
            let mut state = shared.state.lock();
            if state.generation == generation {
                state.outbound.push_front(frame);
            } else {
                parting.lock().push_front(frame);
            }
            return Err(error);
        }
    }
}

/// Deliberate close of an open connection: the frames `close` handed over,
/// then `disconnect`, then the close handshake.
async fn finish(shared: &Shared, parting: &Parting, sink: &mut FrameSink) {
    let mut frames = std::mem::take(&mut *parting.lock());
    while let Some(frame) = frames.pop_front() {
        if let Err(error) = sink.send(frame.clone()).await {
            tracing::warn!(error = %error, unsent = frames.len() + 1, "connection failed while closing");
            frames.push_front(frame);
            restore(shared, frames);
            return;
        }
    }
    if let Err(error) = sink.send(outbound::disconnect(&shared.session_id).to_frame()).await {
        tracing::warn!(error = %error, "could not announce disconnect");
    }
    if let Err(error) = sink.close().await {
        tracing::debug!(error = %error, "close handshake failed");
    }
}

/// Put frames a closing connection never wrote back at the head of the
/// queue, ahead of anything sent since.
fn restore(shared: &Shared, frames: VecDeque<String>) {
    if frames.is_empty() {
        return;
    }
    let mut state = shared.state.lock();
    for frame in frames.into_iter().rev() {
        state.outbound.push_front(frame);
    }
}

/// One keep-alive period elapsed. Returns `true` when the session must be
/// suspended.
fn keep_alive_tick(shared: &Shared, generation: u64) -> bool {
    let suspended = {
        let mut state = shared.state.lock();
        if state.generation != generation {
            return false;
        }
        if std::mem::take(&mut state.sent_since_tick) {
            return false;
        }
        state.idle += shared.config.keep_alive_interval;

        let exceeded = shared
            .config
            .max_inactivity
            .is_some_and(|max| state.idle >= max);
        if exceeded {
            state.connect_requested = false;
            state.connection = ConnectionState::Disconnected;
            state.run = None;
        } else {
            state.outbound.push_back(outbound::keep_alive().to_frame());
        }
        exceeded
    };

    if suspended {
        tracing::info!(session_id = %shared.session_id, "inactivity limit reached, session suspended");
        shared.emit(TransportEvent::SessionSuspended);
    }
    suspended
}
