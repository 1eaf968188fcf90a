//! Page resource loading.
//!
//! Stylesheets are applied at once and only once. Scripts declare the
//! capability names they `provides` and `requires`; the [`ResourceLoader`]
//! starts a script only when everything it requires has been provided, and
//! holds the transport's inbound dispatch while any script is loading.

pub mod descriptor;
pub mod error;
pub mod host;
pub mod loader;
pub mod resolver;

pub use descriptor::{ScriptDescriptor, ScriptSource};
pub use error::ResourceError;
pub use host::{Backpressure, ScriptHost};
pub use loader::{LoaderConfig, ResourceLoader};
pub use resolver::{PendingScript, Resolver};
