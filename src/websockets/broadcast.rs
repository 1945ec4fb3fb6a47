use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::messages::OutboundEvent;
use super::registry::{ConnectionHandle, ConnectionRegistry, Departed, Recipient};

/// Outcome of one broadcast call
#[derive(Default)]
pub struct BroadcastReport {
    /// Connections selected by the collect phase
    pub targeted: usize,
    pub delivered: usize,
    /// Connections whose write failed and that were removed from the registry
    pub reaped: Vec<Departed>,
}

/// Fan-out of one event to every connection matching a room filter.
///
/// Runs in three phases: collect (registry lock), deliver (no lock held),
/// reap (registry lock). A failed write only affects its own connection.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Phase 1: connections in `room` (empty matches all), minus `exclude`
    pub fn collect(&self, room: &str, exclude: Option<ConnectionHandle>) -> Vec<Recipient> {
        self.registry.snapshot(room, exclude)
    }

    /// Phase 2: one write per recipient. Returns the handles whose write failed.
    pub async fn deliver(&self, frame: &str, recipients: &[Recipient]) -> Vec<ConnectionHandle> {
        let writes = recipients.iter().map(|recipient| async move {
            match recipient.sink.send_text(frame.to_string()).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        handle = %recipient.handle,
                        error = %e,
                        "Write to client failed, scheduling removal"
                    );
                    Some(recipient.handle)
                }
            }
        });

        join_all(writes).await.into_iter().flatten().collect()
    }

    /// Phase 3: removes failed connections from the registry, then closes them
    pub async fn reap(&self, failed: &[ConnectionHandle]) -> Vec<Departed> {
        if failed.is_empty() {
            return Vec::new();
        }

        let departed = self.registry.reap(failed);
        for connection in &departed {
            connection.sink.close().await;
            debug!(
                handle = %connection.handle,
                remote_addr = %connection.remote_addr,
                "Reaped failed connection"
            );
        }
        departed
    }

    /// Serializes `event` once and runs collect, deliver and reap
    #[instrument(skip(self, event, exclude), fields(event = %event.event))]
    pub async fn broadcast(
        &self,
        event: &OutboundEvent,
        room: &str,
        exclude: Option<ConnectionHandle>,
    ) -> BroadcastReport {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound event");
                return BroadcastReport::default();
            }
        };

        let recipients = self.collect(room, exclude);
        let failed = self.deliver(&frame, &recipients).await;
        let reaped = self.reap(&failed).await;

        debug!(
            room_id = %room,
            targeted = recipients.len(),
            failed = failed.len(),
            "Broadcast finished"
        );

        BroadcastReport {
            targeted: recipients.len(),
            delivered: recipients.len() - failed.len(),
            reaped,
        }
    }
}
