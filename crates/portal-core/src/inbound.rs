//! Typed view of the notifications the page client consumes itself.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::PortletId;
use crate::methods;
use crate::notification::Notification;

/// Script descriptor as sent by the portal. Exactly one of `uri` and
/// `source` is expected to be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Inbound notification classified by method name.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Reload,
    AddPageResources {
        css_uris: Vec<String>,
        css_source: Option<String>,
        script_resources: Vec<ScriptResource>,
    },
    LastPortalLayout {
        preview_layout: Value,
        tabs_layout: Value,
    },
    InvokePortletMethod {
        portlet_class: String,
        portlet_id: PortletId,
        method: String,
        params: Vec<Value>,
    },
    /// Any method the page client does not interpret itself.
    Other(Notification),
}

impl TryFrom<&Notification> for Inbound {
    type Error = ProtocolError;

    fn try_from(n: &Notification) -> Result<Self, Self::Error> {
        match n.method() {
            methods::RELOAD => Ok(Self::Reload),
            methods::ADD_PAGE_RESOURCES => Ok(Self::AddPageResources {
                css_uris: optional_param(n, 0)?.unwrap_or_default(),
                css_source: optional_param(n, 1)?,
                script_resources: optional_param(n, 2)?.unwrap_or_default(),
            }),
            methods::LAST_PORTAL_LAYOUT => Ok(Self::LastPortalLayout {
                preview_layout: n.params().first().cloned().unwrap_or(Value::Null),
                tabs_layout: n.params().get(1).cloned().unwrap_or(Value::Null),
            }),
            methods::INVOKE_PORTLET_METHOD => Ok(Self::InvokePortletMethod {
                portlet_class: required_param(n, 0)?,
                portlet_id: required_param(n, 1)?,
                method: required_param(n, 2)?,
                params: match n.params().get(3) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(values)) => values.clone(),
                    Some(other) => vec![other.clone()],
                },
            }),
            _ => Ok(Self::Other(n.clone())),
        }
    }
}

fn required_param<T: DeserializeOwned>(n: &Notification, index: usize) -> Result<T, ProtocolError> {
    optional_param(n, index)?.ok_or_else(|| ProtocolError::InvalidParams {
        method: n.method().to_owned(),
        reason: format!("missing argument {index}"),
    })
}

fn optional_param<T: DeserializeOwned>(
    n: &Notification,
    index: usize,
) -> Result<Option<T>, ProtocolError> {
    match n.params().get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ProtocolError::InvalidParams {
                method: n.method().to_owned(),
                reason: format!("argument {index}: {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: &str) -> Result<Inbound, ProtocolError> {
        Inbound::try_from(&Notification::from_frame(frame).unwrap())
    }

    #[test]
    fn reload_has_no_params() {
        assert_eq!(parse(r#"{"jsonrpc":"2.0","method":"reload"}"#).unwrap(), Inbound::Reload);
    }

    #[test]
    fn add_page_resources_with_null_css_source() {
        let inbound = parse(
            r#"{"method":"addPageResources","params":[[], null, [{"uri":"a.js","provides":["x"],"requires":[]}]]}"#,
        )
        .unwrap();
        let Inbound::AddPageResources { css_uris, css_source, script_resources } = inbound else {
            panic!("wrong variant");
        };
        assert!(css_uris.is_empty());
        assert!(css_source.is_none());
        assert_eq!(script_resources.len(), 1);
        assert_eq!(script_resources[0].uri.as_deref(), Some("a.js"));
        assert_eq!(script_resources[0].provides, vec!["x".to_string()]);
        assert!(script_resources[0].requires.is_empty());
    }

    #[test]
    fn script_resource_defaults_missing_lists() {
        let res: ScriptResource = serde_json::from_value(json!({"source": "init()"})).unwrap();
        assert_eq!(res.source.as_deref(), Some("init()"));
        assert!(res.provides.is_empty());
        assert!(res.requires.is_empty());
    }

    #[test]
    fn invoke_portlet_method() {
        let inbound =
            parse(r#"{"method":"invokePortletMethod","params":["T","id1","m",[1,"two"]]}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::InvokePortletMethod {
                portlet_class: "T".into(),
                portlet_id: PortletId::from_raw("id1"),
                method: "m".into(),
                params: vec![json!(1), json!("two")],
            }
        );
    }

    #[test]
    fn invoke_portlet_method_requires_method_name() {
        let err = parse(r#"{"method":"invokePortletMethod","params":["T","id1"]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParams { .. }));
    }

    #[test]
    fn last_portal_layout_keeps_raw_values() {
        let inbound =
            parse(r#"{"method":"lastPortalLayout","params":[["a","b"],{"tabs":["c"]}]}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::LastPortalLayout {
                preview_layout: json!(["a", "b"]),
                tabs_layout: json!({"tabs": ["c"]}),
            }
        );
    }

    #[test]
    fn wrongly_typed_css_uris_are_rejected() {
        let err = parse(r#"{"method":"addPageResources","params":["a.css"]}"#).unwrap_err();
        assert!(err.to_string().contains("addPageResources"));
    }

    #[test]
    fn unknown_methods_pass_through() {
        let inbound = parse(r#"{"method":"updatePortlet","params":["p1"]}"#).unwrap();
        assert!(matches!(inbound, Inbound::Other(n) if n.method() == "updatePortlet"));
    }
}
