//! The page client: a session transport, a resource loader gating inbound
//! dispatch, and routing of portlet method invocations, wired together.

pub mod client;
pub mod events;
pub mod router;

pub use client::{PortalClient, PortalLayout};
pub use events::PortalEvent;
pub use router::{PortletMethod, PortletMethodRegistry};
