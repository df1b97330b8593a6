use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::realtime::gateway::Gateway;
use crate::realtime::registry::{ConnectionId, EventSender};
use crate::realtime::types::ClientEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(gateway): State<Gateway>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, gateway))
}

/// One task pair per participant: the writer drains the connection's event
/// queue in order (FIFO delivery per connection), the reader dispatches
/// inbound frames to the gateway in arrival order.
async fn handle_socket(socket: WebSocket, gateway: Gateway) {
    let conn = ConnectionId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "failed to encode outbound event");
                    continue;
                }
            };

            if ws_tx.send(Message::text(frame)).await.is_err() {
                break;
            }
        }
    });

    info!(connection = %conn, "client connected");

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch_frame(&gateway, conn, &tx, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            // pings are answered by axum; binary frames are not part of the protocol
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %conn, error = %e, "websocket error");
                break;
            }
        }
    }

    gateway.disconnect(conn);
    writer.abort();
    info!(connection = %conn, "client disconnected");
}

async fn dispatch_frame(gateway: &Gateway, conn: ConnectionId, tx: &EventSender, raw: &str) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!(connection = %conn, error = %e, "malformed client frame");
            report_error(tx, "malformed event");
            return;
        }
    };

    let result = match event {
        ClientEvent::JoinTicket { ticket_id } => gateway.join_room(conn, tx.clone(), &ticket_id),
        ClientEvent::SendMessage {
            ticket_id,
            message,
            user_id,
            username,
            role,
        } => {
            gateway
                .send_message(&ticket_id, &user_id, &username, role, &message)
                .await
        }
    };

    if let Err(e) = result {
        debug!(connection = %conn, error = %e, "client event failed");
        report_error(tx, &e.to_string());
    }
}

/// Errors go to the offending connection only, never to the room.
fn report_error(tx: &EventSender, error: &str) {
    _ = tx.send(crate::realtime::types::ServerEvent::MessageError {
        error: error.to_string(),
    });
}
