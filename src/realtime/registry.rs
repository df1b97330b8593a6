use core::fmt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::realtime::types::ServerEvent;
use crate::store::TicketId;

/// Outbound handle for one participant connection. Each connection drains its
/// receiver from a single writer task, so delivery order per connection
/// matches send order.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-memory room membership: ticket id to the set of connections currently
/// viewing that ticket. Purely ephemeral; rebuilt empty on restart, so clients
/// re-join after reconnecting.
///
/// Handles are cheap clones over shared state so the registry can be
/// constructed per test (or swapped out) instead of living in a process-wide
/// static.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<TicketId, HashMap<ConnectionId, EventSender>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to the room for `ticket_id`, creating the room if absent.
    /// Re-joining replaces the existing entry, so a connection is never
    /// delivered the same broadcast twice.
    pub fn join(&self, ticket_id: &TicketId, conn: ConnectionId, sender: EventSender) {
        let mut rooms = self.rooms.write().unwrap();
        rooms
            .entry(ticket_id.clone())
            .or_default()
            .insert(conn, sender);
        debug!(ticket = %ticket_id, connection = %conn, "joined ticket room");
    }

    pub fn leave(&self, ticket_id: &TicketId, conn: ConnectionId) {
        let mut rooms = self.rooms.write().unwrap();
        if let Some(members) = rooms.get_mut(ticket_id) {
            members.remove(&conn);
            if members.is_empty() {
                rooms.remove(ticket_id);
            }
        }
    }

    /// Drops `conn` from every room it is a member of; emptied rooms are
    /// discarded. Runs on disconnect.
    pub fn leave_all(&self, conn: ConnectionId) {
        let mut rooms = self.rooms.write().unwrap();
        rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    /// Delivers `event` to every member of the room, the originating
    /// connection included. A missing or empty room delivers to nobody.
    /// Members whose receiver is gone are pruned on the way through.
    /// Returns the delivery count.
    pub fn broadcast(&self, ticket_id: &TicketId, event: &ServerEvent) -> usize {
        let (delivered, dead) = {
            let rooms = self.rooms.read().unwrap();
            let Some(members) = rooms.get(ticket_id) else {
                return 0;
            };

            let dead: Vec<ConnectionId> = members
                .iter()
                .filter(|(_, sender)| sender.send(event.clone()).is_err())
                .map(|(conn, _)| *conn)
                .collect();

            (members.len() - dead.len(), dead)
        };

        for conn in dead {
            debug!(ticket = %ticket_id, connection = %conn, "pruning closed connection");
            self.leave(ticket_id, conn);
        }

        delivered
    }

    pub fn member_count(&self, ticket_id: &TicketId) -> usize {
        self.rooms
            .read()
            .unwrap()
            .get(ticket_id)
            .map_or(0, HashMap::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::tests::test_event;

    fn member(registry: &RoomRegistry, ticket: &TicketId) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::new();
        registry.join(ticket, conn, tx);
        (conn, rx)
    }

    #[test]
    fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let ticket = TicketId::from("T1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::new();
        registry.join(&ticket, conn, tx.clone());
        registry.join(&ticket, conn, tx);

        assert_eq!(registry.member_count(&ticket), 1);
        assert_eq!(registry.broadcast(&ticket, &test_event("once")), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_reaches_only_the_target_room() {
        let registry = RoomRegistry::new();
        let t1 = TicketId::from("T1");
        let t2 = TicketId::from("T2");

        let (_, mut rx_a) = member(&registry, &t1);
        let (_, mut rx_b) = member(&registry, &t1);
        let (_, mut rx_other) = member(&registry, &t2);

        assert_eq!(registry.broadcast(&t1, &test_event("hello")), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn broadcast_to_absent_room_is_silently_dropped() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast(&TicketId::from("nope"), &test_event("x")), 0);
    }

    #[test]
    fn empty_rooms_are_discarded_on_leave() {
        let registry = RoomRegistry::new();
        let ticket = TicketId::from("T1");
        let (conn, _rx) = member(&registry, &ticket);

        assert_eq!(registry.room_count(), 1);
        registry.leave(&ticket, conn);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn leave_all_clears_every_membership() {
        let registry = RoomRegistry::new();
        let t1 = TicketId::from("T1");
        let t2 = TicketId::from("T2");

        // one connection may be in several rooms at once
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::new();
        registry.join(&t1, conn, tx.clone());
        registry.join(&t2, conn, tx);
        let (_, mut rx_b) = member(&registry, &t1);

        registry.leave_all(conn);
        assert_eq!(registry.member_count(&t1), 1);
        assert_eq!(registry.member_count(&t2), 0);
        assert_eq!(registry.room_count(), 1);

        assert_eq!(registry.broadcast(&t1, &test_event("still here")), 1);
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn closed_receivers_are_pruned_during_broadcast() {
        let registry = RoomRegistry::new();
        let ticket = TicketId::from("T1");

        let (_, _rx_live) = member(&registry, &ticket);
        let (_, rx_dead) = member(&registry, &ticket);
        drop(rx_dead);

        assert_eq!(registry.broadcast(&ticket, &test_event("ping")), 1);
        assert_eq!(registry.member_count(&ticket), 1);
    }
}
