use core::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::store::{Ticket, User};

pub type NotifyResult<T> = core::result::Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail relay request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail relay rejected message ({0})")]
    Rejected(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailTemplate {
    pub subject: String,
    pub body: String,
}

/// Email dispatch as the core sees it; the mail infrastructure itself is a
/// collaborator.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn send(&self, recipient: &str, mail: &MailTemplate) -> NotifyResult<()>;
}

/// High-priority template sent to the assigned staff member when a ticket
/// crosses its SLA deadline while still open.
pub fn overdue_ticket(ticket: &Ticket, staff: &User) -> MailTemplate {
    MailTemplate {
        subject: format!("[URGENT] Ticket #{} has breached its SLA", ticket.id),
        body: format!(
            "Ticket #{} (\"{}\") assigned to you ({}) passed its SLA deadline at {}.\n\
             Please respond to the customer as soon as possible.",
            ticket.id,
            ticket.subject,
            staff.id,
            ticket.sla_deadline.to_rfc3339(),
        ),
    }
}

#[derive(Debug, Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Notifier backed by an HTTP mail relay; messages are posted as JSON to the
/// relay's send endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    sender: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str, sender: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            sender: sender.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip(self, mail))]
    async fn send(&self, recipient: &str, mail: &MailTemplate) -> NotifyResult<()> {
        let payload = OutboundMail {
            from: &self.sender,
            to: recipient,
            subject: &mail.subject,
            body: &mail.body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }

        Ok(())
    }
}
