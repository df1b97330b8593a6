use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{ChatRole, TicketId};

/// Events a participant sends over the websocket, tagged by `event` with the
/// original protocol's camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinTicket { ticket_id: String },

    #[serde(rename_all = "camelCase")]
    SendMessage {
        ticket_id: String,
        message: String,
        user_id: String,
        username: String,
        role: ChatRole,
    },
}

/// Events pushed to participants. `MessageError` only ever goes to the
/// connection whose event failed, never to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        username: String,
        role: ChatRole,
        message: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename_all = "camelCase")]
    MessageError { error: String },

    #[serde(rename_all = "camelCase")]
    TicketUpdate {
        ticket_id: TicketId,
        update: serde_json::Value,
    },
}
