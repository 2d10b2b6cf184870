//! Reconnect supervisor
//!
//! Rebuilds a session's connection after a failure, backing off
//! exponentially between attempts.

use crate::error::GatewayError;
use crate::session::GatewaySession;
use std::sync::Arc;
use std::time::Duration;

/// First wait between reconnect attempts
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff ceiling
const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Reconnect `session` until it opens or the error says to stop.
///
/// `immediate` skips the first wait, for server-requested reconnects
/// where the old connection was closed deliberately. A racing open from
/// elsewhere ends the supervisor quietly.
pub(crate) async fn supervise(session: Arc<GatewaySession>, immediate: bool) {
    if !session.config().reconnect_on_error {
        tracing::info!("auto-reconnect disabled, staying offline");
        return;
    }

    let mut wait = INITIAL_BACKOFF;
    let mut first = true;
    loop {
        if !(first && immediate) {
            tracing::info!(wait_secs = wait.as_secs(), "waiting before reconnect attempt");
            tokio::time::sleep(wait).await;
            wait = (wait * 2).min(MAX_BACKOFF);
        }
        first = false;

        match session.open().await {
            Ok(()) => {
                tracing::info!("reconnected to gateway");
                return;
            }
            Err(GatewayError::AlreadyOpen) => return,
            Err(e) if !e.is_recoverable() => {
                tracing::error!(error = %e, "reconnect abandoned");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect attempt failed");
            }
        }
    }
}
