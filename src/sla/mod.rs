use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::notify::{self, Notifier, NotifyError};
use crate::store::{StoreError, Ticket, TicketId, TicketStore, UserDirectory, UserId};

pub type SlaResult<T> = core::result::Result<T, SlaError>;

#[derive(Debug, Error)]
pub enum SlaError {
    #[error("overdue ticket query failed: {0}")]
    Store(#[from] StoreError),

    #[error("could not resolve assignee '{user}' for ticket '{ticket}': {source}")]
    Lookup {
        ticket: TicketId,
        user: UserId,
        source: StoreError,
    },

    #[error("breach notification for ticket '{ticket}' failed: {source}")]
    Notify {
        ticket: TicketId,
        source: NotifyError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Overdue tickets returned by the store.
    pub scanned: usize,
    /// Breach mails handed to the notifier.
    pub notified: usize,
    /// Tickets skipped for lack of an assignee or a reachable email.
    pub skipped: usize,
    /// Tickets whose lookup or notification failed; the scan continued past
    /// them.
    pub failed: usize,
}

/// Periodic SLA breach monitor: every `interval` it queries for open tickets
/// whose deadline has passed and mails the assigned staff member. Scans are
/// serialized; a failed scan never prevents the next one. The monitor keeps
/// no memory of prior notifications, so a ticket that stays overdue is
/// re-notified on every scan.
#[derive(Debug)]
pub struct SlaMonitor {
    tickets: Arc<dyn TicketStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl SlaMonitor {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            tickets,
            users,
            notifier,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately; the first scan belongs one
            // interval in
            tick.tick().await;

            info!(interval_secs = self.interval.as_secs(), "sla monitor started");
            loop {
                tick.tick().await;
                if let Err(e) = self.scan(Utc::now()).await {
                    error!(error = %e, "sla scan aborted");
                }
            }
        })
    }

    /// One pass over the overdue tickets. Per-ticket failures are logged and
    /// counted without aborting the rest of the scan.
    pub async fn scan(&self, now: DateTime<Utc>) -> SlaResult<ScanSummary> {
        let overdue = self.tickets.find_overdue(now).await?;
        let mut summary = ScanSummary {
            scanned: overdue.len(),
            ..Default::default()
        };

        for ticket in &overdue {
            match self.notify_breach(ticket).await {
                Ok(true) => summary.notified += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(ticket = %ticket.id, error = %e, "sla breach notification failed");
                }
            }
        }

        info!(
            scanned = summary.scanned,
            notified = summary.notified,
            skipped = summary.skipped,
            failed = summary.failed,
            "sla scan complete"
        );
        Ok(summary)
    }

    /// Returns `Ok(true)` when a mail went out, `Ok(false)` when the ticket
    /// was skipped (unassigned, unknown assignee, no email).
    async fn notify_breach(&self, ticket: &Ticket) -> SlaResult<bool> {
        let Some(assignee) = &ticket.assigned_to else {
            debug!(ticket = %ticket.id, "overdue ticket has no assignee");
            return Ok(false);
        };

        let staff = self
            .users
            .find_user(assignee)
            .await
            .map_err(|source| SlaError::Lookup {
                ticket: ticket.id.clone(),
                user: assignee.clone(),
                source,
            })?;

        let Some(staff) = staff else {
            warn!(ticket = %ticket.id, user = %assignee, "assignee not found");
            return Ok(false);
        };
        let Some(email) = staff.email.as_deref() else {
            warn!(ticket = %ticket.id, user = %staff.id, "assignee has no email");
            return Ok(false);
        };

        let mail = notify::overdue_ticket(ticket, &staff);
        self.notifier
            .send(email, &mail)
            .await
            .map_err(|source| SlaError::Notify {
                ticket: ticket.id.clone(),
                source,
            })?;

        info!(ticket = %ticket.id, staff = %email, "sla breach email sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::realtime::tests::{
        staff_user, ticket, MemoryTicketStore, MemoryUserDirectory, RecordingNotifier,
    };
    use crate::store::TicketStatus;

    fn monitor(
        store: &MemoryTicketStore,
        users: &MemoryUserDirectory,
        notifier: &RecordingNotifier,
    ) -> SlaMonitor {
        SlaMonitor::new(
            Arc::new(store.clone()),
            Arc::new(users.clone()),
            Arc::new(notifier.clone()),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn one_failing_notification_does_not_abort_the_scan() {
        let now = Utc::now();
        let overdue = now - TimeDelta::hours(2);
        let store = MemoryTicketStore::with_overdue(vec![
            ticket("T1", Some("s1"), overdue),
            ticket("T2", Some("s2"), overdue),
            ticket("T3", Some("s3"), overdue),
        ]);
        let users = MemoryUserDirectory::default();
        users.insert(staff_user("s1", Some("s1@example.com")));
        users.insert(staff_user("s2", Some("s2@example.com")));
        users.insert(staff_user("s3", Some("s3@example.com")));
        let notifier = RecordingNotifier::default();
        notifier.fail_for("s2@example.com");

        let summary = monitor(&store, &users, &notifier).scan(now).await.unwrap();

        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.notified, 2);
        assert_eq!(summary.failed, 1);

        let sent = notifier.sent();
        let recipients: Vec<&str> = sent.iter().map(|(to, _)| to.as_str()).collect();
        assert_eq!(recipients, vec!["s1@example.com", "s3@example.com"]);
    }

    #[tokio::test]
    async fn overdue_tickets_are_renotified_on_every_scan() {
        let now = Utc::now();
        let store =
            MemoryTicketStore::with_overdue(vec![ticket("T1", Some("s1"), now - TimeDelta::hours(1))]);
        let users = MemoryUserDirectory::default();
        users.insert(staff_user("s1", Some("s1@example.com")));
        let notifier = RecordingNotifier::default();
        let monitor = monitor(&store, &users, &notifier);

        monitor.scan(now).await.unwrap();
        monitor.scan(now + TimeDelta::hours(1)).await.unwrap();

        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn unassigned_tickets_are_skipped() {
        let now = Utc::now();
        let store =
            MemoryTicketStore::with_overdue(vec![ticket("T1", None, now - TimeDelta::hours(1))]);
        let users = MemoryUserDirectory::default();
        let notifier = RecordingNotifier::default();

        let summary = monitor(&store, &users, &notifier).scan(now).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn assignees_without_email_are_skipped() {
        let now = Utc::now();
        let store = MemoryTicketStore::with_overdue(vec![
            ticket("T1", Some("s1"), now - TimeDelta::hours(1)),
            ticket("T2", Some("ghost"), now - TimeDelta::hours(1)),
        ]);
        let users = MemoryUserDirectory::default();
        users.insert(staff_user("s1", None));
        let notifier = RecordingNotifier::default();

        let summary = monitor(&store, &users, &notifier).scan(now).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn closed_and_future_tickets_are_not_scanned() {
        let now = Utc::now();
        let mut closed = ticket("T1", Some("s1"), now - TimeDelta::hours(1));
        closed.status = TicketStatus::Closed;
        let future = ticket("T2", Some("s1"), now + TimeDelta::hours(1));
        let store = MemoryTicketStore::with_overdue(vec![closed, future]);
        let users = MemoryUserDirectory::default();
        users.insert(staff_user("s1", Some("s1@example.com")));
        let notifier = RecordingNotifier::default();

        let summary = monitor(&store, &users, &notifier).scan(now).await.unwrap();

        assert_eq!(summary.scanned, 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_scans_once_per_interval() {
        let overdue = Utc::now() - TimeDelta::hours(1);
        let store = MemoryTicketStore::with_overdue(vec![ticket("T1", Some("s1"), overdue)]);
        let users = MemoryUserDirectory::default();
        users.insert(staff_user("s1", Some("s1@example.com")));
        let notifier = RecordingNotifier::default();

        let monitor = SlaMonitor::new(
            Arc::new(store.clone()),
            Arc::new(users.clone()),
            Arc::new(notifier.clone()),
            Duration::from_secs(60),
        );
        let handle = monitor.spawn();

        // no scan before the first interval elapses
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.sent().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(notifier.sent().len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(notifier.sent().len(), 2);

        handle.abort();
    }
}
