//! Repository layer for database operations

pub mod authors;
pub mod books;
pub mod loans;
pub mod members;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        loan::{Loan, LoanNotice, NewLoan},
        member::MemberActivity,
    },
};

/// Transactional lending operations.
///
/// Every method either applies all of its changes or none of them; implementations
/// serialize the read-check-write of a book's `available_copies` per book.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Lend one copy of a book to a member
    async fn checkout(&self, loan: NewLoan) -> AppResult<Loan>;

    /// Close the member's most recent active loan for the book
    async fn return_loan(&self, book_id: i32, member_id: i32, return_date: NaiveDate) -> AppResult<Loan>;

    /// Push back the due date of a loan that is neither returned nor overdue by
    /// `raw_days`, which is only validated once the loan itself qualifies
    async fn extend_due_date(&self, loan_id: i32, raw_days: &Value, today: NaiveDate) -> AppResult<Loan>;

    /// Active loans whose due date is before `today`
    async fn find_overdue(&self, today: NaiveDate) -> AppResult<Vec<Loan>>;

    /// Members with at least one active loan, most active first, ties by id
    async fn top_active_members(&self, limit: i64) -> AppResult<Vec<MemberActivity>>;

    async fn loan_notice(&self, loan_id: i32) -> AppResult<Option<LoanNotice>>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub authors: authors::AuthorsRepository,
    pub books: books::BooksRepository,
    pub members: members::MembersRepository,
    pub loans: loans::LoansRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>, lock_timeout_ms: u64) -> Self {
        Self {
            authors: authors::AuthorsRepository::new(pool.clone()),
            books: books::BooksRepository::new(pool.clone()),
            members: members::MembersRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone(), lock_timeout_ms),
            pool,
        }
    }

    /// Check database connectivity
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
