//! # portal
//!
//! Headless page client: connects to a portal session, loads the page
//! resources it is sent and logs portlet updates until interrupted. A
//! session suspended for inactivity resumes when Enter is pressed.

#![deny(unsafe_code)]

mod host;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use portal_client::{PortalClient, PortalEvent};
use portal_core::{methods, FileStorage, MemoryStorage, SessionIdentity, SessionStorage};
use portal_settings::PortalSettings;
use portal_telemetry::{init_telemetry, TelemetryConfig};
use portal_transport::TransportEvent;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::host::HttpScriptHost;

/// Portal page client.
#[derive(Parser, Debug)]
#[command(name = "portal", about = "Headless portal page client")]
struct Cli {
    /// Session endpoint prefix, e.g. `ws://localhost:5001/portal/portal-session`.
    #[arg(long)]
    url: Option<String>,

    /// Settings file (defaults to `~/.portal/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// File keeping the session identifier across runs.
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Log JSON lines.
    #[arg(long)]
    json_logs: bool,
}

fn load_settings(cli: &Cli) -> Result<PortalSettings> {
    let mut settings = match &cli.settings {
        Some(path) => portal_settings::load_settings_from_path(path),
        None => portal_settings::load_settings(),
    }
    .context("Failed to load settings")?;

    if let Some(url) = &cli.url {
        settings.transport.base_url.clone_from(url);
    }
    if let Some(path) = &cli.session_file {
        settings.session.storage_path = Some(path.clone());
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let _telemetry = init_telemetry(&TelemetryConfig::from(&settings.logging))
        .context("Failed to initialize logging")?;

    let storage: Box<dyn SessionStorage> = match &settings.session.storage_path {
        Some(path) => Box::new(FileStorage::new(path)),
        None => Box::new(MemoryStorage::new()),
    };
    let session_id = SessionIdentity::get_or_create(storage.as_ref());
    tracing::info!(session_id = %session_id, url = %settings.transport.base_url, "starting portal client");

    let host = HttpScriptHost::for_endpoint(&settings.transport.base_url)?;
    let client = PortalClient::new(session_id, &settings, Arc::new(host));

    for method in [
        methods::UPDATE_PORTLET,
        methods::PORTAL_CONFIGURED,
        methods::DELETE_PORTLET,
    ] {
        client.add_notification_handler(method, move |params: &[Value]| {
            tracing::info!(method, params = %serde_json::Value::from(params.to_vec()), "portal notification");
            Ok(())
        });
    }

    let mut events = client.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut suspended = false;
    client.connect();
    client.portal_ready();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if suspended => match line {
                Ok(Some(_)) => {
                    tracing::info!("resuming session");
                    suspended = false;
                    client.connect();
                }
                // No terminal to resume from.
                Ok(None) | Err(_) => break,
            },
            event = events.recv() => match event {
                Ok(PortalEvent::Reload) => tracing::info!("portal requested a reload"),
                Ok(PortalEvent::Transport(TransportEvent::SessionSuspended)) => {
                    tracing::warn!("session suspended after inactivity, press Enter to resume");
                    suspended = true;
                }
                Ok(PortalEvent::Transport(event)) => tracing::info!(?event, "transport"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "events lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("shutting down");
    client.close();
    // Give the close frame a moment to go out.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
