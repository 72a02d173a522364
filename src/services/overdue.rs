//! Periodic overdue sweep
//!
//! Each run scans for active loans past their due date and schedules one reminder
//! per loan. Runs are stateless: a loan still overdue tomorrow is reminded again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::{
    repository::LoanStore,
    services::notifications::{NotificationJob, NotificationKind, NotificationQueue},
};

/// Outcome of one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub overdue: usize,
    pub scheduled: usize,
    pub failed: usize,
    /// The scan itself failed and nothing was scheduled
    pub aborted: bool,
}

#[derive(Clone)]
pub struct OverdueSweep {
    store: Arc<dyn LoanStore>,
    queue: Arc<dyn NotificationQueue>,
}

impl OverdueSweep {
    pub fn new(store: Arc<dyn LoanStore>, queue: Arc<dyn NotificationQueue>) -> Self {
        Self { store, queue }
    }

    /// Run one sweep. Never fails: errors are logged and reflected in the report.
    pub async fn run_once(&self, today: NaiveDate) -> SweepReport {
        let overdue = match self.store.find_overdue(today).await {
            Ok(loans) => loans,
            Err(e) => {
                tracing::error!(error = %e, %today, "Overdue scan failed");
                return SweepReport {
                    aborted: true,
                    ..SweepReport::default()
                };
            }
        };

        let mut report = SweepReport {
            overdue: overdue.len(),
            ..SweepReport::default()
        };

        for loan in &overdue {
            let job = NotificationJob::new(NotificationKind::OverdueReminder, loan.id);
            match self.queue.enqueue(job).await {
                Ok(()) => report.scheduled += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(loan_id = loan.id, error = %e, "Could not schedule overdue reminder");
                }
            }
        }

        tracing::info!(
            %today,
            overdue = report.overdue,
            scheduled = report.scheduled,
            failed = report.failed,
            "Overdue sweep finished"
        );
        report
    }

    /// Run the sweep every `interval`, starting immediately
    pub fn spawn(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_once(Utc::now().date_naive()).await;
            }
        })
    }
}
