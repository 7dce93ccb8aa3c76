//! Session event logging background task

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Log every session event broadcast by the application state.
///
/// Runs until the sender side is dropped.
pub async fn event_log_task(state: Arc<AppState>) {
    info!("Starting session event log task");

    let mut event_rx = state.event_tx.subscribe();
    loop {
        match event_rx.recv().await {
            Ok(event) => match (&event.error, event.status) {
                (Some(error), _) => {
                    warn!("Study {} {} failed: {}", event.study_id, event.action, error);
                }
                (None, Some(status)) => {
                    info!("Study {} {} -> {}", event.study_id, event.action, status);
                }
                (None, None) => {
                    debug!("Study {} {}", event.study_id, event.action);
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event log fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Event channel closed, stopping event log task");
                break;
            }
        }
    }
}
