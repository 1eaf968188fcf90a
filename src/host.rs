//! Headless script host: stylesheets and inline code are recorded in the
//! log, script URIs are fetched over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use portal_resources::{ResourceError, ScriptHost};
use reqwest::Url;

pub struct HttpScriptHost {
    client: reqwest::Client,
    /// Relative script URIs resolve against this.
    base: Url,
}

impl HttpScriptHost {
    /// Host resolving relative URIs against the HTTP origin of the
    /// WebSocket endpoint `ws_base`.
    pub fn for_endpoint(ws_base: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(ws_base)?;
        let scheme = if base.scheme() == "wss" { "https" } else { "http" };
        base.set_scheme(scheme)
            .map_err(|()| anyhow::anyhow!("cannot derive an HTTP origin from {ws_base}"))?;
        base.set_path("/");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("portal/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }
}

#[async_trait]
impl ScriptHost for HttpScriptHost {
    fn apply_stylesheet(&self, uri: &str) {
        tracing::info!(uri, "stylesheet");
    }

    fn apply_inline_style(&self, css: &str) {
        tracing::debug!(bytes = css.len(), "inline style");
    }

    fn execute_inline(&self, source: &str) -> Result<(), ResourceError> {
        tracing::debug!(bytes = source.len(), "inline script");
        Ok(())
    }

    async fn load_script(&self, uri: &str) -> Result<(), ResourceError> {
        let load_error = |reason: String| ResourceError::Load {
            uri: uri.to_owned(),
            reason,
        };
        let url = self.base.join(uri).map_err(|e| load_error(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| load_error(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(load_error(format!("HTTP {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| load_error(format!("failed to read body: {e}")))?;

        tracing::info!(uri, bytes = body.len(), "script fetched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_follows_endpoint_scheme() {
        let host = HttpScriptHost::for_endpoint("wss://example.org/portal/portal-session").unwrap();
        assert_eq!(host.base.as_str(), "https://example.org/");
        assert_eq!(
            host.base.join("portal-resource/a.js").unwrap().as_str(),
            "https://example.org/portal-resource/a.js"
        );

        let host = HttpScriptHost::for_endpoint("ws://localhost:5001/portal/portal-session").unwrap();
        assert_eq!(host.base.as_str(), "http://localhost:5001/");
    }
}
