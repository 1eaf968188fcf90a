//! Builders for the notifications the page client sends to the portal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::{PortletId, SessionId};
use crate::methods;
use crate::notification::Notification;

/// How a portlet is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    Preview,
    View,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "Preview",
            Self::View => "View",
        }
    }
}

pub fn portal_ready() -> Notification {
    Notification::new(methods::PORTAL_READY)
}

pub fn keep_alive() -> Notification {
    Notification::new(methods::KEEP_ALIVE)
}

/// Announces a deliberate close so the portal can release the session.
pub fn disconnect(session_id: &SessionId) -> Notification {
    Notification::with_params(methods::DISCONNECT, vec![json!(session_id)])
}

pub fn render_portlet(portlet_id: &PortletId, mode: RenderMode) -> Notification {
    Notification::with_params(
        methods::RENDER_PORTLET,
        vec![json!(portlet_id), json!(mode.as_str())],
    )
}

pub fn set_theme(theme_id: &str) -> Notification {
    Notification::with_params(methods::SET_THEME, vec![json!(theme_id)])
}

pub fn set_locale(locale: &str) -> Notification {
    Notification::with_params(methods::SET_LOCALE, vec![json!(locale)])
}

/// Forward a portlet-specific call. Without `params` the third argument is
/// left out entirely rather than sent as `null`.
pub fn send_to_portlet(portlet_id: &PortletId, method: &str, params: Option<Value>) -> Notification {
    let mut args = vec![json!(portlet_id), json!(method)];
    if let Some(params) = params {
        args.push(params);
    }
    Notification::with_params(methods::SEND_TO_PORTLET, args)
}

pub fn add_portlet(portlet_type: &str, mode: RenderMode) -> Notification {
    Notification::with_params(
        methods::ADD_PORTLET,
        vec![json!(portlet_type), json!(mode.as_str())],
    )
}

pub fn delete_portlet(portlet_id: &PortletId) -> Notification {
    Notification::with_params(methods::DELETE_PORTLET, vec![json!(portlet_id)])
}

pub fn portal_layout(preview_layout: Value, tabs_layout: Value) -> Notification {
    Notification::with_params(methods::PORTAL_LAYOUT, vec![preview_layout, tabs_layout])
}
