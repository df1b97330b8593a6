use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::realtime::connection::ws_handler;
use crate::realtime::gateway::Gateway;
use crate::store::TicketId;

pub fn router(gateway: Gateway, cors_allow_origins: &str) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/tickets/{ticket_id}/events", post(push_ticket_update))
        .route("/checkhealth", get(|| async { "SERVER_OK" }))
        .layer(cors_layer(cors_allow_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

fn cors_layer(allow_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    if allow_origins.trim() == "*" {
        layer.allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<HeaderValue> = allow_origins
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushSummary {
    pub delivered: usize,
}

/// Entry point for the ticket CRUD layer: a status change or reassignment is
/// posted here and fanned out to everyone viewing the ticket.
async fn push_ticket_update(
    State(gateway): State<Gateway>,
    Path(ticket_id): Path<String>,
    Json(update): Json<Value>,
) -> Json<PushSummary> {
    let delivered = gateway.emit_ticket_update(&TicketId::from(ticket_id), update);
    Json(PushSummary { delivered })
}
