use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::store::models::TicketRow;
use crate::store::{
    NewMessage, StoreResult, Ticket, TicketId, TicketStore, User, UserDirectory, UserId,
};
use crate::util::env;

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);

pub async fn db_pool() -> StoreResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    async fn new_pool() -> StoreResult<Self> {
        let env = env::env().await?;
        let pool = sqlx::PgPool::connect(&env.database_url).await?;

        Ok(Self { pool })
    }
}

#[derive(Debug)]
pub struct PgTicketStore {
    pool: &'static PgPool,
}

impl PgTicketStore {
    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    #[instrument(skip(self))]
    async fn find_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT id, subject, status, assigned_to, sla_deadline, created_at, updated_at
            FROM ticket
            WHERE status <> 'closed' AND sla_deadline < $1
            ORDER BY sla_deadline
            "#,
        )
        .bind(now)
        .fetch_all(self.pool)
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "overdue ticket query failed"))?;

        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    #[instrument(skip(self, message))]
    async fn append_message(&self, ticket_id: &TicketId, message: &NewMessage) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ticket_message (ticket_id, sender, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ticket_id)
        .bind(&message.sender)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(self.pool)
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "failure during message append"))?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct PgUserDirectory {
    pool: &'static PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[instrument(skip(self))]
    async fn find_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, roles, points
            FROM account
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn increment_points(&self, id: &UserId, amount: i64) -> StoreResult<i64> {
        let points: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE account
            SET points = points + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING points
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(self.pool)
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "failure during points update"))?;

        points.ok_or_else(|| crate::store::StoreError::UnknownUser(id.clone()))
    }
}
