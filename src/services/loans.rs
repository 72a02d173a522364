//! Loan lifecycle service: checkout, return and due-date extension

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde_json::Value;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::loan::{Loan, LoanQuery, NewLoan},
    repository::{LoanStore, Repository},
    services::notifications::{NotificationJob, NotificationKind, NotificationQueue},
};

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn LoanStore>,
    queue: Arc<dyn NotificationQueue>,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(store: Arc<dyn LoanStore>, queue: Arc<dyn NotificationQueue>, config: LoansConfig) -> Self {
        Self { store, queue, config }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Lend one copy of a book to a member.
    ///
    /// The loan is committed before the confirmation is queued; a queueing failure
    /// is logged and never undoes the loan.
    pub async fn checkout(&self, book_id: i32, member_id: i32) -> AppResult<Loan> {
        let today = Self::today();
        let loan_days = u64::try_from(self.config.default_loan_days)
            .map_err(|_| AppError::Internal("default_loan_days must not be negative".to_string()))?;
        let due_date = today
            .checked_add_days(Days::new(loan_days))
            .ok_or_else(|| AppError::Internal("Due date out of range".to_string()))?;

        let loan = self
            .store
            .checkout(NewLoan {
                book_id,
                member_id,
                loan_date: today,
                due_date,
            })
            .await?;

        tracing::info!(loan_id = loan.id, book_id, member_id, due_date = %loan.due_date, "Book loaned");
        self.notify(NotificationKind::LoanConfirmation, loan.id).await;

        Ok(loan)
    }

    /// Take back a book from a member, closing their active loan for it
    pub async fn return_book(&self, book_id: i32, member_id: i32) -> AppResult<Loan> {
        let loan = self.store.return_loan(book_id, member_id, Self::today()).await?;

        tracing::info!(loan_id = loan.id, book_id, member_id, "Book returned");
        if self.config.send_return_receipts {
            self.notify(NotificationKind::ReturnReceipt, loan.id).await;
        }

        Ok(loan)
    }

    /// Push back the due date of a loan by `raw_days`, given as a JSON number or digit string.
    ///
    /// The loan is checked (exists, not returned, not overdue) before the day count.
    pub async fn extend_due_date(&self, loan_id: i32, raw_days: &Value) -> AppResult<Loan> {
        let loan = self.store.extend_due_date(loan_id, raw_days, Self::today()).await?;

        tracing::info!(loan_id, %raw_days, new_due_date = %loan.due_date, "Due date extended");
        Ok(loan)
    }

    async fn notify(&self, kind: NotificationKind, loan_id: i32) {
        let job = NotificationJob::new(kind, loan_id);
        let job_id = job.id;
        if let Err(e) = self.queue.enqueue(job).await {
            tracing::warn!(%job_id, loan_id, ?kind, error = %e, "Could not schedule notification");
        }
    }
}

/// Read-side loan queries backed by the PostgreSQL repository
#[derive(Clone)]
pub struct LoanQueries {
    repository: Repository,
}

impl LoanQueries {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_loan(&self, id: i32) -> AppResult<Loan> {
        self.repository.loans.get_by_id(id).await
    }

    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<Loan>> {
        self.repository.loans.list(query, Utc::now().date_naive()).await
    }

    /// Active loans of a member
    pub async fn member_loans(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        // Verify member exists
        self.repository.members.get_by_id(member_id).await?;
        self.repository.loans.get_member_loans(member_id).await
    }
}
