use portal_transport::TransportEvent;

/// What the page has to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortalEvent {
    /// The portal asked for a full page reload.
    Reload,
    Transport(TransportEvent),
}

impl From<TransportEvent> for PortalEvent {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}
