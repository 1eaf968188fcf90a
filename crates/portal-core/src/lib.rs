//! Shared types for the portal page client: identifiers, the JSON-RPC
//! notification codec, typed inbound payloads, outbound command builders
//! and the per-tab session identity.

pub mod errors;
pub mod ids;
pub mod inbound;
pub mod methods;
pub mod notification;
pub mod outbound;
pub mod session;

pub use errors::{HandlerError, ProtocolError, StorageError};
pub use ids::{PortletId, SessionId};
pub use inbound::{Inbound, ScriptResource};
pub use notification::Notification;
pub use outbound::RenderMode;
pub use session::{FileStorage, MemoryStorage, SessionIdentity, SessionStorage};
