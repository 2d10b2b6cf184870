//! Client facade
//!
//! Bundles the REST client, the gateway session and the event router
//! behind one handle, and bridges REST rate limit notifications into
//! the event stream as synthetic events.

use crate::error::GatewayError;
use crate::events::{EventPayload, EventRouter, GatewayEvent};
use crate::session::GatewaySession;
use pulse_common::ClientConfig;
use pulse_rest::RestClient;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A Pulse client: REST plus gateway
pub struct Client {
    rest: Arc<RestClient>,
    gateway: Arc<GatewaySession>,
    router: Arc<EventRouter>,
}

impl Client {
    /// Create a client from the given configuration.
    ///
    /// Must be called inside a tokio runtime; the rate limit bridge
    /// task is spawned here.
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        let rest = Arc::new(RestClient::new(config.clone())?);
        let router = EventRouter::new();

        spawn_rate_limit_bridge(rest.limiter().subscribe(), &router);

        let gateway = GatewaySession::new(config, Arc::clone(&rest), Arc::clone(&router));
        Ok(Self {
            rest,
            gateway,
            router,
        })
    }

    /// The REST client
    #[must_use]
    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    /// The gateway session
    #[must_use]
    pub fn gateway(&self) -> &Arc<GatewaySession> {
        &self.gateway
    }

    /// Connect to the gateway
    pub async fn open(&self) -> Result<(), GatewayError> {
        self.gateway.open().await
    }

    /// Disconnect from the gateway, keeping resume state
    pub async fn close(&self) -> Result<(), GatewayError> {
        self.gateway.close().await
    }

    /// Disconnect permanently, dropping resume state
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        self.gateway.shutdown().await
    }

    /// Update the client's presence status
    pub async fn update_presence(&self, status: &str) -> Result<(), GatewayError> {
        self.gateway.update_presence(status).await
    }

    /// Subscribe to one event type
    pub fn on<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(event_type, handler);
    }

    /// Subscribe to every event
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.router.subscribe_all(handler);
    }
}

/// Forward rate limit notifications from the REST layer into the event
/// stream. The task ends when the router is dropped.
fn spawn_rate_limit_bridge(
    mut events: broadcast::Receiver<pulse_rest::RateLimitEvent>,
    router: &Arc<EventRouter>,
) {
    let router = Arc::downgrade(router);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(router) = router.upgrade() else { return };
                    router.dispatch(GatewayEvent::synthetic(EventPayload::RateLimited(event)));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "rate limit notifications lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}
