//! Routing of `invokePortletMethod` by portlet class and method name.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use portal_core::{HandlerError, PortletId};
use serde_json::Value;

/// Called with the addressed portlet and the invocation params.
pub type PortletMethod = Arc<dyn Fn(&PortletId, &[Value]) -> Result<(), HandlerError> + Send + Sync>;

/// Portlet class → method name → function.
#[derive(Default)]
pub struct PortletMethodRegistry {
    classes: DashMap<String, HashMap<String, PortletMethod>>,
}

impl PortletMethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` for `portlet_class`, replacing an earlier one.
    pub fn register<F>(&self, portlet_class: impl Into<String>, method: impl Into<String>, f: F)
    where
        F: Fn(&PortletId, &[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let _ = self
            .classes
            .entry(portlet_class.into())
            .or_default()
            .insert(method.into(), Arc::new(f));
    }

    /// Invoke a registered method. An unknown class or method is not an
    /// error: the portlet may have gone away since the portal sent the call.
    pub fn invoke(
        &self,
        portlet_class: &str,
        portlet_id: &PortletId,
        method: &str,
        params: &[Value],
    ) -> Result<(), HandlerError> {
        // Clone out of the map so `f` may register methods itself.
        let f = self
            .classes
            .get(portlet_class)
            .and_then(|methods| methods.get(method).cloned());
        let Some(f) = f else {
            tracing::debug!(
                portlet_class,
                portlet_id = %portlet_id,
                method,
                "no portlet method registered, ignoring"
            );
            return Ok(());
        };
        f(portlet_id, params)
    }

    pub fn contains(&self, portlet_class: &str, method: &str) -> bool {
        self.classes
            .get(portlet_class)
            .is_some_and(|methods| methods.contains_key(method))
    }
}
