//! Seams to the page the loader works on.

use async_trait::async_trait;
use portal_transport::{Transport, WeakTransport};

use crate::error::ResourceError;

/// The document resources are applied to.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    fn apply_stylesheet(&self, uri: &str);

    fn apply_inline_style(&self, css: &str);

    /// Run inline script source to completion.
    fn execute_inline(&self, source: &str) -> Result<(), ResourceError>;

    /// Fetch and run the script at `uri`.
    async fn load_script(&self, uri: &str) -> Result<(), ResourceError>;
}

/// Pauses inbound dispatch while scripts load. Calls are balanced.
pub trait Backpressure: Send + Sync {
    fn lock(&self);
    fn unlock(&self);
}

impl Backpressure for Transport {
    fn lock(&self) {
        Transport::lock(self);
    }

    fn unlock(&self) {
        Transport::unlock(self);
    }
}

/// Does nothing once the transport is gone.
impl Backpressure for WeakTransport {
    fn lock(&self) {
        if let Some(transport) = self.upgrade() {
            transport.lock();
        }
    }

    fn unlock(&self) {
        if let Some(transport) = self.upgrade() {
            transport.unlock();
        }
    }
}
