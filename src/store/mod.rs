use core::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::util::env;

pub mod models;
pub mod pg;

pub use models::{ChatRole, NewMessage, Ticket, TicketId, TicketStatus, User, UserId};

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("unrecognized ticket status '{0}'")]
    InvalidStatus(String),

    #[error("unknown user '{0}'")]
    UnknownUser(UserId),

    #[error("{0}")]
    Env(#[from] env::EnvError),
}

/// Ticket persistence as the realtime core sees it. The CRUD layer owns the
/// schema and every field except the message log, which the core appends to.
#[async_trait]
pub trait TicketStore: Send + Sync + fmt::Debug {
    /// Tickets that are not closed and whose SLA deadline has passed at `now`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Ticket>>;

    async fn append_message(&self, ticket_id: &TicketId, message: &NewMessage) -> StoreResult<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync + fmt::Debug {
    async fn find_user(&self, id: &UserId) -> StoreResult<Option<User>>;

    /// Adds `amount` to the user's participation points, returning the new
    /// total.
    async fn increment_points(&self, id: &UserId, amount: i64) -> StoreResult<i64>;
}
