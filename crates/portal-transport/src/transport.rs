//! Session-bound, reconnecting notification transport.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use portal_core::{Notification, SessionId};
use serde_json::Value;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::connector::{Connector, WsConnector};
use crate::events::{ConnectionState, TransportEvent};
use crate::registry::HandlerRegistry;
use crate::supervisor;

const EVENT_CAPACITY: usize = 64;

/// Handle to a transport. Clones share the same connection and queues.
///
/// `connect` and `close` must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

/// Non-owning handle, for collaborators the transport itself keeps alive.
#[derive(Clone)]
pub struct WeakTransport {
    shared: Weak<Shared>,
}

impl WeakTransport {
    pub fn upgrade(&self) -> Option<Transport> {
        self.shared.upgrade().map(|shared| Transport { shared })
    }
}

pub(crate) struct Shared {
    pub(crate) config: TransportConfig,
    pub(crate) session_id: SessionId,
    pub(crate) endpoint: String,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) state: Mutex<State>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) outbound_ready: Notify,
    events: broadcast::Sender<TransportEvent>,
}

pub(crate) struct State {
    pub(crate) connect_requested: bool,
    pub(crate) connection: ConnectionState,
    /// Bumped on every `connect`/`close` so a superseded supervisor never
    /// touches the state of its successor.
    pub(crate) generation: u64,
    /// Present while a supervisor runs.
    pub(crate) run: Option<Run>,
    /// The most recently started supervisor. Its successor waits for it, so
    /// an old connection has said `disconnect` before a new one opens.
    pub(crate) previous: Option<JoinHandle<()>>,
    pub(crate) outbound: VecDeque<String>,
    pub(crate) inbound: VecDeque<Notification>,
    pub(crate) lock_count: usize,
    pub(crate) dispatching: bool,
    pub(crate) sent_since_tick: bool,
    pub(crate) idle: Duration,
}

/// Frames `close` took from the queue for the closing connection to write
/// ahead of `disconnect`.
pub(crate) type Parting = Arc<Mutex<VecDeque<String>>>;

pub(crate) struct Run {
    pub(crate) cancel: CancellationToken,
    pub(crate) parting: Parting,
}

impl Transport {
    /// WebSocket transport for `session_id`.
    pub fn new(session_id: SessionId, config: TransportConfig) -> Self {
        Self::with_connector(session_id, config, Arc::new(WsConnector))
    }

    pub fn with_connector(
        session_id: SessionId,
        config: TransportConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let endpoint = config.endpoint(session_id.as_str());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Shared {
            config,
            session_id,
            endpoint,
            connector,
            state: Mutex::new(State {
                connect_requested: false,
                connection: ConnectionState::Disconnected,
                generation: 0,
                run: None,
                previous: None,
                outbound: VecDeque::new(),
                inbound: VecDeque::new(),
                lock_count: 0,
                dispatching: false,
                sent_since_tick: false,
                idle: Duration::ZERO,
            }),
            handlers: HandlerRegistry::new(),
            outbound_ready: Notify::new(),
            events,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    pub fn downgrade(&self) -> WeakTransport {
        WeakTransport {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// `{base_url}/{session_id}`.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    // ── Connection lifecycle ──

    /// Request a connection. Idempotent: while a connection is open, being
    /// opened, or waiting for its reconnect delay, this only (re)asserts
    /// the request.
    pub fn connect(&self) {
        let mut state = self.shared.state.lock();
        state.connect_requested = true;
        if state.run.is_some() {
            return;
        }
        state.generation += 1;
        state.connection = ConnectionState::Connecting;
        state.idle = Duration::ZERO;
        state.sent_since_tick = false;
        let run = Run {
            cancel: CancellationToken::new(),
            parting: Parting::default(),
        };
        let task = supervisor::run(
            self.shared.clone(),
            state.generation,
            run.cancel.clone(),
            run.parting.clone(),
            state.previous.take(),
        );
        state.run = Some(run);

        tracing::info!(endpoint = %self.shared.endpoint, "connecting");
        state.previous = Some(tokio::spawn(task));
    }

    /// Deliberate close. No reconnect follows. An open connection first
    /// writes whatever is queued at this moment, then `disconnect(sessionId)`,
    /// then closes; frames sent after `close` wait for the next `connect`.
    /// When not open nothing is sent and the outbound queue is kept.
    pub fn close(&self) {
        let run = {
            let mut state = self.shared.state.lock();
            state.connect_requested = false;
            state.generation += 1;
            let was_open = state.connection == ConnectionState::Open;
            state.connection = ConnectionState::Disconnected;
            let run = state.run.take();
            if let (Some(run), true) = (&run, was_open) {
                let frames: Vec<String> = state.outbound.drain(..).collect();
                run.parting.lock().extend(frames);
            }
            run
        };
        if let Some(run) = run {
            tracing::info!(session_id = %self.shared.session_id, "closing");
            run.cancel.cancel();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().connection
    }

    /// Whether the caller currently wants a connection.
    pub fn connect_requested(&self) -> bool {
        self.shared.state.lock().connect_requested
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    // ── Outbound ──

    /// Queue `notification` for delivery. Resets the inactivity counter.
    /// Frames are written in call order, across reconnects.
    pub fn send(&self, notification: Notification) {
        {
            let mut state = self.shared.state.lock();
            state.idle = Duration::ZERO;
            state.sent_since_tick = true;
            state.outbound.push_back(notification.to_frame());
        }
        self.shared.outbound_ready.notify_one();
    }

    /// Frames queued but not yet written.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().outbound.len()
    }

    // ── Inbound ──

    pub fn add_notification_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<(), portal_core::HandlerError> + Send + Sync + 'static,
    {
        self.shared.handlers.register(method, Arc::new(handler));
    }

    /// Pause inbound dispatch. Calls nest.
    pub fn lock(&self) {
        let mut state = self.shared.state.lock();
        state.lock_count += 1;
        tracing::trace!(lock_count = state.lock_count, "dispatch locked");
    }

    /// Undo one `lock`. Reaching zero resumes dispatch of anything queued.
    pub fn unlock(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.lock_count == 0 {
                tracing::warn!("unlock without matching lock ignored");
                return;
            }
            state.lock_count -= 1;
            tracing::trace!(lock_count = state.lock_count, "dispatch unlocked");
            if state.lock_count > 0 {
                return;
            }
        }
        self.shared.dispatch();
    }

    pub fn lock_count(&self) -> usize {
        self.shared.state.lock().lock_count
    }

    /// Inbound notifications waiting for dispatch.
    pub fn pending_inbound(&self) -> usize {
        self.shared.state.lock().inbound.len()
    }
}

impl Shared {
    pub(crate) fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Decode one inbound frame, queue it and dispatch.
    pub(crate) fn receive(&self, frame: &str) {
        match Notification::from_frame(frame) {
            Ok(notification) => {
                self.state.lock().inbound.push_back(notification);
                self.dispatch();
            }
            Err(error) => {
                tracing::warn!(error = %error, "dropping undecodable frame");
            }
        }
    }

    /// Drain the inbound queue while unlocked. At most one caller drains at
    /// a time; a nested or concurrent call returns at once and the active
    /// loop picks up its work. Handlers run with the state lock released.
    pub(crate) fn dispatch(&self) {
        {
            let mut state = self.state.lock();
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }

        loop {
            let next = {
                let mut state = self.state.lock();
                let next = if state.lock_count == 0 {
                    state.inbound.pop_front()
                } else {
                    None
                };
                if next.is_none() {
                    state.dispatching = false;
                }
                next
            };
            let Some(notification) = next else {
                return;
            };
            self.invoke(&notification);
        }
    }

    /// Run the handler for `notification`. Errors and panics are logged; the
    /// stream keeps flowing.
    fn invoke(&self, notification: &Notification) {
        let method = notification.method();
        let Some(handler) = self.handlers.get(method) else {
            tracing::error!(method, "no handler for notification, dropped");
            return;
        };
        tracing::debug!(method, "dispatching notification");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler(notification.params())
        }));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(
                    method,
                    error = %error,
                    error_kind = error.error_kind(),
                    "notification handler failed"
                );
            }
            Err(panic) => {
                tracing::error!(
                    method,
                    panic = %panic_message(&panic),
                    "notification handler panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
