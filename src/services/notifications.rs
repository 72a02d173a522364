//! Loan notifications: job model, queue seam, dispatching and the delivery worker
//!
//! Lending operations only ever enqueue a [`NotificationJob`]; the worker resolves
//! the job against the current catalog state and hands the composed e-mail to a
//! [`Mailer`]. Delivery is at-least-once and best-effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::JobsConfig,
    error::AppResult,
    models::loan::LoanNotice,
    repository::LoanStore,
    services::{email::Mailer, redis::RedisNotificationQueue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LoanConfirmation,
    OverdueReminder,
    ReturnReceipt,
}

/// One queued e-mail about a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub loan_id: i32,
    #[serde(default)]
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn new(kind: NotificationKind, loan_id: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            loan_id,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// The same job, scheduled again after a failed delivery
    pub fn retried(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Durable work queue the lending operations schedule notifications on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: NotificationJob) -> AppResult<()>;
}

/// Subject and body of an outgoing e-mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedEmail {
    pub subject: String,
    pub body: String,
}

pub fn compose(kind: NotificationKind, notice: &LoanNotice) -> ComposedEmail {
    match kind {
        NotificationKind::LoanConfirmation => ComposedEmail {
            subject: "Book Loaned Successfully".to_string(),
            body: format!(
                "Hello {},\n\nYou have successfully loaned \"{}\".\nPlease return it by {}.",
                notice.username,
                notice.book_title,
                format_date(notice.due_date)
            ),
        },
        NotificationKind::OverdueReminder => ComposedEmail {
            subject: "Overdue Book Notice".to_string(),
            body: format!(
                "Dear {},\n\n\"{}\" was due on {}. Please return it as soon as possible.",
                notice.username,
                notice.book_title,
                format_date(notice.due_date)
            ),
        },
        NotificationKind::ReturnReceipt => ComposedEmail {
            subject: "Book Returned Successfully".to_string(),
            body: format!(
                "Hello {},\n\nWe received \"{}\" back on {}. Thank you!",
                notice.username,
                notice.book_title,
                format_date(notice.return_date.unwrap_or(notice.due_date))
            ),
        },
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// The loan is gone or no longer in the state the job was about
    Skipped,
}

/// Turns jobs into delivered e-mails
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn LoanStore>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn LoanStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    pub async fn dispatch(&self, job: &NotificationJob) -> AppResult<DispatchOutcome> {
        let Some(notice) = self.store.loan_notice(job.loan_id).await? else {
            tracing::debug!(job_id = %job.id, loan_id = job.loan_id, "Loan no longer exists, dropping notification");
            return Ok(DispatchOutcome::Skipped);
        };

        let today = Utc::now().date_naive();
        if job.kind == NotificationKind::OverdueReminder && (notice.is_returned || notice.due_date >= today) {
            tracing::debug!(job_id = %job.id, loan_id = job.loan_id, "Loan no longer overdue, dropping reminder");
            return Ok(DispatchOutcome::Skipped);
        }

        let email = compose(job.kind, &notice);
        self.mailer.send(&notice.email, &email.subject, &email.body).await?;

        tracing::info!(
            job_id = %job.id,
            loan_id = job.loan_id,
            kind = ?job.kind,
            "Notification sent"
        );
        Ok(DispatchOutcome::Sent)
    }
}

/// Background loop consuming the Redis notification queue
pub struct NotificationWorker {
    queue: RedisNotificationQueue,
    dispatcher: NotificationDispatcher,
    config: JobsConfig,
}

impl NotificationWorker {
    pub fn new(queue: RedisNotificationQueue, dispatcher: NotificationDispatcher, config: JobsConfig) -> Self {
        Self { queue, dispatcher, config }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        match self.queue.recover_in_flight().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(recovered = n, "Re-queued notifications left in flight"),
            Err(e) => tracing::warn!(error = %e, "Could not recover in-flight notifications"),
        }

        let poll_timeout = Duration::from_secs(self.config.worker_poll_timeout_secs.max(1));
        loop {
            let reserved = match self.queue.reserve(poll_timeout).await {
                Ok(Some(reserved)) => reserved,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Notification queue unavailable, backing off");
                    tokio::time::sleep(poll_timeout).await;
                    continue;
                }
            };

            let Some(job) = reserved.job.clone() else {
                tracing::error!(payload = %reserved.payload, "Discarding malformed notification payload");
                self.acknowledge(&reserved.payload).await;
                continue;
            };

            if let Err(e) = self.dispatcher.dispatch(&job).await {
                self.handle_failure(&job, &e.to_string()).await;
            }
            self.acknowledge(&reserved.payload).await;
        }
    }

    async fn handle_failure(&self, job: &NotificationJob, error: &str) {
        let next = job.retried();
        if next.attempts >= self.config.max_delivery_attempts {
            tracing::error!(
                job_id = %job.id,
                loan_id = job.loan_id,
                attempts = next.attempts,
                error,
                "Giving up on notification"
            );
            return;
        }

        tracing::warn!(job_id = %job.id, attempts = next.attempts, error, "Notification failed, re-queueing");
        if let Err(e) = self.queue.enqueue(next).await {
            tracing::error!(job_id = %job.id, error = %e, "Could not re-queue notification");
        }
    }

    async fn acknowledge(&self, payload: &str) {
        if let Err(e) = self.queue.ack(payload).await {
            tracing::warn!(error = %e, "Could not acknowledge notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AppError, repository::memory::MemoryLoanStore, services::email::MockMailer};
    use chrono::Days;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn store_with_loan(due: NaiveDate) -> (Arc<MemoryLoanStore>, i32) {
        let store = Arc::new(MemoryLoanStore::new());
        store.add_book(1, "The Left Hand of Darkness", 2);
        store.add_member(1, "ursula");
        let loan = store.seed_loan(1, 1, today() - Days::new(20), due);
        (store, loan.id)
    }

    #[test]
    fn job_serializes_as_snake_case_json() {
        let job = NotificationJob::new(NotificationKind::OverdueReminder, 42);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"], "overdue_reminder");
        assert_eq!(json["loan_id"], 42);

        let back: NotificationJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn retried_job_keeps_identity() {
        let job = NotificationJob::new(NotificationKind::LoanConfirmation, 1);
        let retried = job.retried().retried();
        assert_eq!(retried.id, job.id);
        assert_eq!(retried.attempts, 2);
    }

    #[test]
    fn confirmation_names_member_title_and_due_date() {
        let notice = LoanNotice {
            loan_id: 1,
            username: "ursula".into(),
            email: "ursula@example.org".into(),
            book_title: "The Dispossessed".into(),
            loan_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            is_returned: false,
            return_date: None,
        };
        let email = compose(NotificationKind::LoanConfirmation, &notice);
        assert_eq!(email.subject, "Book Loaned Successfully");
        assert!(email.body.starts_with("Hello ursula,"));
        assert!(email.body.contains("\"The Dispossessed\""));
        assert!(email.body.contains("2024-03-15"));
    }

    #[tokio::test]
    async fn dispatch_sends_to_member_address() {
        let (store, loan_id) = store_with_loan(today() + Days::new(5));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|to, subject, _| {
                to.to_string() == "ursula@example.org" && subject.to_string() == "Book Loaned Successfully"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = NotificationDispatcher::new(store, Arc::new(mailer));
        let job = NotificationJob::new(NotificationKind::LoanConfirmation, loan_id);
        assert_eq!(dispatcher.dispatch(&job).await.unwrap(), DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn dispatch_skips_missing_loans() {
        let (store, _) = store_with_loan(today());
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();

        let dispatcher = NotificationDispatcher::new(store, Arc::new(mailer));
        let job = NotificationJob::new(NotificationKind::LoanConfirmation, 999);
        assert_eq!(dispatcher.dispatch(&job).await.unwrap(), DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn reminder_skipped_once_loan_is_returned() {
        let (store, loan_id) = store_with_loan(today() - Days::new(3));
        store.return_loan(1, 1, today()).await.unwrap();
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();

        let dispatcher = NotificationDispatcher::new(store, Arc::new(mailer));
        let job = NotificationJob::new(NotificationKind::OverdueReminder, loan_id);
        assert_eq!(dispatcher.dispatch(&job).await.unwrap(), DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn reminder_sent_for_overdue_loan() {
        let (store, loan_id) = store_with_loan(today() - Days::new(3));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|_, subject, _| subject.to_string() == "Overdue Book Notice")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = NotificationDispatcher::new(store, Arc::new(mailer));
        let job = NotificationJob::new(NotificationKind::OverdueReminder, loan_id);
        assert_eq!(dispatcher.dispatch(&job).await.unwrap(), DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_to_worker() {
        let (store, loan_id) = store_with_loan(today() + Days::new(5));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .returning(|_, _, _| Err(AppError::Internal("smtp down".into())));

        let dispatcher = NotificationDispatcher::new(store, Arc::new(mailer));
        let job = NotificationJob::new(NotificationKind::LoanConfirmation, loan_id);
        assert!(dispatcher.dispatch(&job).await.is_err());
    }
}
