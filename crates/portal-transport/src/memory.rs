//! In-process connector. Each successful `connect` hands the other end of
//! the connection to the receiver returned by [`MemoryConnector::new`], so
//! a test can play the portal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use portal_core::Notification;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::connector::{Connection, Connector};
use crate::error::TransportError;

pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusals: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            refusals: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        });
        (connector, accepted)
    }

    /// Fail the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_owned(),
                reason: "refused".into(),
            });
        }

        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
        let (to_client, client_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            endpoint: endpoint.to_owned(),
            from_client,
            to_client,
        };
        self.peers.send(peer).map_err(|_| TransportError::Connect {
            endpoint: endpoint.to_owned(),
            reason: "no listener".into(),
        })?;

        let sink = futures::sink::unfold(client_tx, |tx, frame: String| async move {
            tx.send(frame).map_err(|_| TransportError::ConnectionClosed)?;
            Ok::<_, TransportError>(tx)
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(UnboundedReceiverStream::new(client_rx)),
        })
    }
}

/// Portal side of an in-process connection. Dropping it drops the
/// connection.
pub struct MemoryPeer {
    endpoint: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MemoryPeer {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Next frame written by the client, `None` once the client hung up.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame, decoded. Undecodable frames are skipped.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            let frame = self.next_frame().await?;
            if let Ok(notification) = Notification::from_frame(&frame) {
                return Some(notification);
            }
        }
    }

    /// A frame that is already waiting, without blocking.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Deliver a notification to the client.
    pub fn push(&self, notification: &Notification) {
        self.push_raw(notification.to_frame());
    }

    pub fn push_raw(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(Ok(frame.into()));
    }

    /// Make the client's read half fail.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(Err(TransportError::Receive(reason.to_owned())));
    }
}
