use serde::Serialize;
use serde_json::Value;

use crate::errors::ProtocolError;

const JSONRPC_VERSION: &str = "2.0";

/// A one-way JSON-RPC 2.0 notification: a method name plus optional
/// positional params. Notifications never carry an `id`, so nothing
/// ever answers them.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    method: String,
    params: Option<Vec<Value>>,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a [Value]>,
}

impl Notification {
    /// A notification without params.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Positional params; empty when the notification has none.
    pub fn params(&self) -> &[Value] {
        self.params.as_deref().unwrap_or(&[])
    }

    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    /// Serialize to a text frame. `params` is omitted when absent.
    pub fn to_frame(&self) -> String {
        let wire = WireNotification {
            jsonrpc: JSONRPC_VERSION,
            method: &self.method,
            params: self.params.as_deref(),
        };
        // A struct of strings and JSON values always serializes.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Parse a text frame received from the portal.
    pub fn from_frame(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame)?;
        let Value::Object(mut obj) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if let Some(version) = obj.get("jsonrpc") {
            if version.as_str() != Some(JSONRPC_VERSION) {
                return Err(ProtocolError::UnsupportedVersion(version.to_string()));
            }
        }

        let method = match obj.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(ProtocolError::MissingMethod),
        };

        let params = match obj.remove("params") {
            None | Some(Value::Null) => None,
            Some(Value::Array(params)) => Some(params),
            Some(_) => return Err(ProtocolError::ParamsNotArray { method }),
        };

        Ok(Self { method, params })
    }
}
