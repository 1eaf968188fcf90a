/// Connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Observable transport conditions, delivered over a broadcast channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// First successful open after `connect()`.
    Connected,
    /// An open connection dropped unexpectedly; reconnecting.
    ConnectionLost,
    /// The connection is open again after a drop.
    ConnectionRestored,
    /// Inactivity limit exceeded. The connection was closed and stays closed
    /// until `connect()` is called again.
    SessionSuspended,
    /// The transport stopped connecting, after `close()` or a suspension.
    Closed,
}
