/// Event Router
///
/// Fans outbound events out to registry sessions. Sessions are snapshotted
/// before sending so no registry lock is held while pushing. There is no
/// buffering: a user without sessions is simply reported as not delivered.
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;
use crate::websocket::{ConnectionRegistry, ServerEvent, SessionHandle};

#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns the number of sessions that accepted the event.
    fn deliver(sessions: &[SessionHandle], event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for session in sessions {
            match session.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    user_id = %session.user_id,
                    session_id = %session.session_id,
                    event = event.event_name(),
                    "Session channel closed, skipping"
                ),
            }
        }
        delivered
    }

    /// `true` if at least one of the user's sessions accepted the event
    pub fn send_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let sessions = self.registry.sessions_for(user_id);
        let delivered = !sessions.is_empty() && Self::deliver(&sessions, &event) > 0;

        metrics::record_router_delivery(event.event_name(), delivered);
        debug!(%user_id, event = event.event_name(), delivered, "Routed event to user");
        delivered
    }

    /// Returns how many of the users received the event
    pub fn send_to_users(&self, user_ids: &[Uuid], event: ServerEvent) -> usize {
        user_ids
            .iter()
            .filter(|user_id| self.send_to_user(**user_id, event.clone()))
            .count()
    }

    /// Returns the number of sessions reached
    pub fn broadcast_all(&self, event: ServerEvent) -> usize {
        let sessions = self.registry.all_sessions();
        let delivered = Self::deliver(&sessions, &event);

        metrics::record_router_delivery(event.event_name(), delivered > 0);
        debug!(event = event.event_name(), sessions = delivered, "Broadcast event");
        delivered
    }
}
