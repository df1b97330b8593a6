use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::constants::CHAT_REWARD_POINTS;
use crate::realtime::registry::{ConnectionId, EventSender, RoomRegistry};
use crate::realtime::types::ServerEvent;
use crate::store::{
    ChatRole, NewMessage, StoreError, TicketId, TicketStore, UserDirectory, UserId,
};

pub type GatewayResult<T> = core::result::Result<T, GatewayError>;

/// Failures surfaced to the originating connection only; the room is never
/// notified of another participant's error.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("failed to persist message: {0}")]
    PersistenceFailed(#[source] StoreError),
}

/// Orchestrates the realtime side of a ticket: room membership, chat fan-out,
/// message persistence and the best-effort participation reward.
#[derive(Debug, Clone)]
pub struct Gateway {
    registry: RoomRegistry,
    tickets: Arc<dyn TicketStore>,
    users: Arc<dyn UserDirectory>,
}

impl Gateway {
    pub fn new(
        registry: RoomRegistry,
        tickets: Arc<dyn TicketStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            registry,
            tickets,
            users,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Registers `conn` in the ticket's room. Joining a second ticket does not
    /// leave the first; a connection views as many rooms as it has joined
    /// until it disconnects.
    pub fn join_room(
        &self,
        conn: ConnectionId,
        sender: EventSender,
        ticket_id: &str,
    ) -> GatewayResult<()> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(GatewayError::InvalidMessage("ticket id must not be empty"));
        }

        self.registry.join(&TicketId::from(ticket_id), conn, sender);
        Ok(())
    }

    pub fn disconnect(&self, conn: ConnectionId) {
        self.registry.leave_all(conn);
    }

    /// Validate, broadcast, persist, reward. Broadcast happens before the
    /// durable append; if the append fails the already-broadcast message
    /// stands (other clients may have rendered it) and only the sender sees
    /// the failure.
    pub async fn send_message(
        &self,
        ticket_id: &str,
        user_id: &str,
        username: &str,
        role: ChatRole,
        message: &str,
    ) -> GatewayResult<()> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(GatewayError::InvalidMessage("ticket id must not be empty"));
        }
        if user_id.trim().is_empty() {
            return Err(GatewayError::InvalidMessage("user id must not be empty"));
        }
        if username.trim().is_empty() {
            return Err(GatewayError::InvalidMessage("username must not be empty"));
        }
        if message.trim().is_empty() {
            return Err(GatewayError::InvalidMessage("message must not be blank"));
        }

        let ticket_id = TicketId::from(ticket_id);
        let sender = UserId::from(user_id.trim());
        let timestamp = Utc::now();

        let delivered = self.registry.broadcast(
            &ticket_id,
            &ServerEvent::ReceiveMessage {
                username: username.to_string(),
                role,
                message: message.to_string(),
                timestamp,
            },
        );
        debug!(ticket = %ticket_id, user = %sender, delivered, "chat message relayed");

        let record = NewMessage {
            sender: sender.clone(),
            role,
            content: message.to_string(),
            created_at: timestamp,
        };
        self.tickets
            .append_message(&ticket_id, &record)
            .await
            .map_err(|e| {
                error!(ticket = %ticket_id, user = %sender, error = %e, "message append failed");
                GatewayError::PersistenceFailed(e)
            })?;

        if role.earns_reward() {
            if let Err(e) = self.users.increment_points(&sender, CHAT_REWARD_POINTS).await {
                warn!(user = %sender, error = %e, "failed to award chat participation points");
            }
        }

        Ok(())
    }

    /// Pushes a ticket-state update (status change, reassignment, ..) to every
    /// participant viewing the ticket. Called by the CRUD layer, not by chat
    /// traffic. Returns the delivery count.
    pub fn emit_ticket_update(&self, ticket_id: &TicketId, update: serde_json::Value) -> usize {
        let delivered = self.registry.broadcast(
            ticket_id,
            &ServerEvent::TicketUpdate {
                ticket_id: ticket_id.clone(),
                update,
            },
        );
        info!(ticket = %ticket_id, delivered, "ticket update pushed");

        delivered
    }
}
