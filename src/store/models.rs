use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TicketId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub String);

/// Ticket lifecycle states as the ticket CRUD layer writes them. The realtime
/// core never transitions a ticket itself; `Closed` is the only state that
/// exempts a ticket from SLA scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl FromStr for TicketStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in-progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Role a participant speaks with in a ticket room. Older frontends send the
/// capitalised role names, hence the aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    #[serde(alias = "Customer")]
    Customer,
    #[serde(alias = "Staff")]
    Staff,
    #[serde(alias = "Admin")]
    Admin,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Chat participation points are only awarded to helpdesk personnel.
    pub fn earns_reward(&self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub subject: String,
    pub status: TicketStatus,
    pub assigned_to: Option<UserId>,
    pub sla_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat message awaiting append to a ticket's message log. Messages are
/// immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub sender: UserId,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub points: i64,
}

/// Base ticket table row; `status` is stored as text and validated on the way
/// out.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TicketRow {
    pub id: TicketId,
    pub subject: String,
    pub status: String,
    pub assigned_to: Option<UserId>,
    pub sla_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketRow {
    pub fn into_ticket(self) -> Result<Ticket, StoreError> {
        Ok(Ticket {
            id: self.id,
            subject: self.subject,
            status: self.status.parse()?,
            assigned_to: self.assigned_to,
            sla_deadline: self.sla_deadline,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<String> for TicketId {
    fn from(value: String) -> Self {
        TicketId(value)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        TicketId(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
