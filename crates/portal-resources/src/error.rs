use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("script descriptor has both a uri ({uri}) and inline source")]
    AmbiguousSource { uri: String },

    #[error("script descriptor has neither a uri nor inline source")]
    MissingSource,

    #[error("loading {uri} failed: {reason}")]
    Load { uri: String, reason: String },

    #[error("loading {uri} timed out after {after:?}")]
    Timeout { uri: String, after: Duration },

    #[error("inline script failed: {0}")]
    Execute(String),
}

impl ResourceError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AmbiguousSource { .. } | Self::MissingSource => "invalid_descriptor",
            Self::Load { .. } => "load",
            Self::Timeout { .. } => "timeout",
            Self::Execute(_) => "execute",
        }
    }
}
