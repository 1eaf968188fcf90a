//! Method names on the portal notification channel.

// Browser -> portal
pub const PORTAL_READY: &str = "portalReady";
pub const KEEP_ALIVE: &str = "keepAlive";
pub const DISCONNECT: &str = "disconnect";
pub const RENDER_PORTLET: &str = "renderPortlet";
pub const SET_THEME: &str = "setTheme";
pub const SET_LOCALE: &str = "setLocale";
pub const SEND_TO_PORTLET: &str = "sendToPortlet";
pub const ADD_PORTLET: &str = "addPortlet";
pub const DELETE_PORTLET: &str = "deletePortlet";
pub const PORTAL_LAYOUT: &str = "portalLayout";

// Portal -> browser
pub const RELOAD: &str = "reload";
pub const ADD_PAGE_RESOURCES: &str = "addPageResources";
pub const LAST_PORTAL_LAYOUT: &str = "lastPortalLayout";
pub const INVOKE_PORTLET_METHOD: &str = "invokePortletMethod";
pub const UPDATE_PORTLET: &str = "updatePortlet";
pub const PORTAL_CONFIGURED: &str = "portalConfigured";
