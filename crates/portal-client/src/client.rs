use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use portal_core::{methods, outbound, HandlerError, Inbound, Notification, PortletId, RenderMode, SessionId};
use portal_resources::{LoaderConfig, ResourceLoader, ScriptHost};
use portal_settings::PortalSettings;
use portal_transport::{ConnectionState, Transport, TransportConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::events::PortalEvent;
use crate::router::PortletMethodRegistry;

const EVENT_CAPACITY: usize = 64;

/// Layout last reported by the portal. Kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalLayout {
    pub preview_layout: Value,
    pub tabs_layout: Value,
}

/// Page client for one portal session.
///
/// Handles `reload`, `addPageResources`, `lastPortalLayout` and
/// `invokePortletMethod` itself; other methods go to handlers added with
/// [`add_notification_handler`](Self::add_notification_handler).
#[derive(Clone)]
pub struct PortalClient {
    transport: Transport,
    loader: ResourceLoader,
    portlets: Arc<PortletMethodRegistry>,
    layout: Arc<Mutex<Option<PortalLayout>>>,
    events: broadcast::Sender<PortalEvent>,
    forwarding: Arc<AtomicBool>,
}

impl PortalClient {
    /// WebSocket client configured from `settings`.
    pub fn new(session_id: SessionId, settings: &PortalSettings, host: Arc<dyn ScriptHost>) -> Self {
        let transport = Transport::new(session_id, TransportConfig::from(&settings.transport));
        Self::with_transport(transport, host, LoaderConfig::from(&settings.resources))
    }

    pub fn with_transport(
        transport: Transport,
        host: Arc<dyn ScriptHost>,
        loader_config: LoaderConfig,
    ) -> Self {
        // The transport's handlers own the loader, so the loader only keeps a
        // weak handle back.
        let loader = ResourceLoader::new(host, Arc::new(transport.downgrade()), loader_config);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let client = Self {
            transport,
            loader,
            portlets: Arc::new(PortletMethodRegistry::new()),
            layout: Arc::new(Mutex::new(None)),
            events,
            forwarding: Arc::new(AtomicBool::new(false)),
        };
        client.register_builtin_handlers();
        client
    }

    // ── Built-in handlers ──

    fn register_builtin_handlers(&self) {
        let events = self.events.clone();
        self.transport
            .add_notification_handler(methods::RELOAD, move |params: &[Value]| {
                if let Inbound::Reload = parse(methods::RELOAD, params)? {
                    tracing::info!("portal requested reload");
                    let _ = events.send(PortalEvent::Reload);
                }
                Ok(())
            });

        let loader = self.loader.clone();
        self.transport
            .add_notification_handler(methods::ADD_PAGE_RESOURCES, move |params: &[Value]| {
                if let Inbound::AddPageResources {
                    css_uris,
                    css_source,
                    script_resources,
                } = parse(methods::ADD_PAGE_RESOURCES, params)?
                {
                    loader.submit(&css_uris, css_source.as_deref(), script_resources);
                }
                Ok(())
            });

        let layout = self.layout.clone();
        self.transport
            .add_notification_handler(methods::LAST_PORTAL_LAYOUT, move |params: &[Value]| {
                if let Inbound::LastPortalLayout {
                    preview_layout,
                    tabs_layout,
                } = parse(methods::LAST_PORTAL_LAYOUT, params)?
                {
                    *layout.lock() = Some(PortalLayout {
                        preview_layout,
                        tabs_layout,
                    });
                }
                Ok(())
            });

        let portlets = self.portlets.clone();
        self.transport
            .add_notification_handler(methods::INVOKE_PORTLET_METHOD, move |params: &[Value]| {
                if let Inbound::InvokePortletMethod {
                    portlet_class,
                    portlet_id,
                    method,
                    params,
                } = parse(methods::INVOKE_PORTLET_METHOD, params)?
                {
                    portlets.invoke(&portlet_class, &portlet_id, &method, &params)?;
                }
                Ok(())
            });
    }

    // ── Lifecycle ──

    /// Connect. The first call also starts forwarding transport events to
    /// [`subscribe`](Self::subscribe).
    pub fn connect(&self) {
        if !self.forwarding.swap(true, Ordering::SeqCst) {
            let mut transport_events = self.transport.subscribe();
            let events = self.events.clone();
            let _ = tokio::spawn(async move {
                loop {
                    match transport_events.recv().await {
                        Ok(event) => {
                            let _ = events.send(event.into());
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "transport events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        self.transport.connect();
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> &SessionId {
        self.transport.session_id()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn loader(&self) -> &ResourceLoader {
        &self.loader
    }

    pub fn portlets(&self) -> &PortletMethodRegistry {
        &self.portlets
    }

    pub fn last_portal_layout(&self) -> Option<PortalLayout> {
        self.layout.lock().clone()
    }

    /// Handler for a method the client does not handle itself.
    pub fn add_notification_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.transport.add_notification_handler(method, handler);
    }

    pub fn register_portlet_method<F>(&self, portlet_class: impl Into<String>, method: impl Into<String>, f: F)
    where
        F: Fn(&PortletId, &[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.portlets.register(portlet_class, method, f);
    }

    // ── Outbound ──

    pub fn send(&self, notification: Notification) {
        self.transport.send(notification);
    }

    /// Tell the portal the page is set up. Send once.
    pub fn portal_ready(&self) {
        self.send(outbound::portal_ready());
    }

    pub fn render_portlet(&self, portlet_id: &PortletId, mode: RenderMode) {
        self.send(outbound::render_portlet(portlet_id, mode));
    }

    pub fn set_theme(&self, theme_id: &str) {
        self.send(outbound::set_theme(theme_id));
    }

    pub fn set_locale(&self, locale: &str) {
        self.send(outbound::set_locale(locale));
    }

    pub fn send_to_portlet(&self, portlet_id: &PortletId, method: &str, params: Option<Value>) {
        self.send(outbound::send_to_portlet(portlet_id, method, params));
    }

    pub fn add_portlet(&self, portlet_type: &str, mode: RenderMode) {
        self.send(outbound::add_portlet(portlet_type, mode));
    }

    pub fn delete_portlet(&self, portlet_id: &PortletId) {
        self.send(outbound::delete_portlet(portlet_id));
    }

    pub fn portal_layout(&self, preview_layout: Value, tabs_layout: Value) {
        self.send(outbound::portal_layout(preview_layout, tabs_layout));
    }
}

fn parse(method: &str, params: &[Value]) -> Result<Inbound, HandlerError> {
    let notification = Notification::with_params(method, params.to_vec());
    Ok(Inbound::try_from(&notification)?)
}
