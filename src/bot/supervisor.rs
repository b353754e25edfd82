//! Connection supervisor: owns the gateway session lifecycle and fans
//! events out to the engine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::bot::engine::BotEngine;
use crate::bot::gateway::GatewayClient;
use crate::bot::transport::{ConnectionEvent, SessionEvent, TransportError};

/// Pause before re-polling after a transport failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct ConnectionSupervisor {
    gateway: Arc<GatewayClient>,
    engine: Arc<BotEngine>,
}

impl ConnectionSupervisor {
    pub fn new(gateway: Arc<GatewayClient>, engine: Arc<BotEngine>) -> Self {
        Self { gateway, engine }
    }

    /// Run the event loop until the process is stopped.
    pub async fn run(&self) {
        if let Err(e) = self.gateway.open_session().await {
            warn!("Could not open session yet: {e}");
        }

        loop {
            match self.gateway.next_events().await {
                Ok(events) => {
                    for event in events {
                        self.dispatch(event).await;
                    }
                }
                Err(TransportError::Unauthorized) => {
                    warn!("Session unauthorized; discarding credentials for a fresh login");
                    if let Err(e) = self.gateway.reset_session().await {
                        error!("Session reset failed: {e}");
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => {
                    warn!("Event poll failed, retrying: {e}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn dispatch(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connection(update) => self.handle_connection(update).await,
            SessionEvent::Message(msg) => {
                // Each message is an independent unit of work; interleaving
                // across conversations is fine because handlers only touch
                // their own conversation's state.
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    engine.handle_message(msg).await;
                });
            }
            other => self.engine.handle_event(other).await,
        }
    }

    async fn handle_connection(&self, update: ConnectionEvent) {
        match update {
            ConnectionEvent::Open => info!("Connection is open"),
            ConnectionEvent::Qr(_) => {
                info!("QR code received; scan it from the gateway console");
            }
            ConnectionEvent::Closed { status_code } => {
                if status_code == Some(401) {
                    warn!("Authentication failed; discarding session to force a new QR login");
                    if let Err(e) = self.gateway.reset_session().await {
                        error!("Session reset failed: {e}");
                    }
                } else {
                    info!("Connection closed, attempting to reconnect");
                }
                if let Err(e) = self.gateway.open_session().await {
                    error!("Failed to re-open session: {e}");
                }
            }
        }
    }
}
