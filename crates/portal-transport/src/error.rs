#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("connection closed")]
    ConnectionClosed,
}

impl TransportError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Send(_) => "send",
            Self::Receive(_) => "receive",
            Self::ConnectionClosed => "connection_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_names_endpoint() {
        let err = TransportError::Connect {
            endpoint: "ws://localhost/portal/S1".into(),
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "connect to ws://localhost/portal/S1 failed: refused");
        assert_eq!(err.error_kind(), "connect");
    }
}
