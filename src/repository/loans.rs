//! Loans repository: the transactional lending operations on PostgreSQL
//!
//! Checkout, return and due-date extension each run in a single transaction that
//! first locks the book (or loan) row with `SELECT ... FOR UPDATE`, so concurrent
//! requests on the same book are serialized and `available_copies` is always read
//! from committed state.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{classify_db_error, AppError, AppResult, LoanError},
    models::{
        book::Book,
        loan::{Loan, LoanNotice, LoanQuery, NewLoan},
        member::MemberActivity,
    },
};

use super::LoanStore;

/// Partial unique index guarding the one-active-loan-per-pair rule
const ONE_ACTIVE_PER_PAIR: &str = "loans_one_active_per_pair";

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
    lock_timeout_ms: u64,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// List loans matching the given filters, newest first
    pub async fn list(&self, query: &LoanQuery, today: NaiveDate) -> AppResult<Vec<Loan>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM loans WHERE TRUE");

        if let Some(member_id) = query.member_id {
            builder.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(book_id) = query.book_id {
            builder.push(" AND book_id = ").push_bind(book_id);
        }
        match query.active {
            Some(true) => {
                builder.push(" AND NOT is_returned");
            }
            Some(false) => {
                builder.push(" AND is_returned");
            }
            None => {}
        }
        if query.overdue == Some(true) {
            builder.push(" AND NOT is_returned AND due_date < ").push_bind(today);
        }
        builder.push(" ORDER BY loan_date DESC, id DESC");

        let loans = builder.build_query_as::<Loan>().fetch_all(&self.pool).await?;
        Ok(loans)
    }

    /// Active loans of a member, oldest due date first
    pub async fn get_member_loans(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE member_id = $1 AND NOT is_returned ORDER BY due_date, id",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Begin a transaction whose row-lock waits are bounded
    async fn begin_locking(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // SET LOCAL does not accept bind parameters
        sqlx::query(&format!("SET LOCAL lock_timeout = {}", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn lock_book(tx: &mut Transaction<'static, Postgres>, book_id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify_db_error)?
            .ok_or_else(|| LoanError::BookNotFound(book_id).into())
    }

    async fn checkout_in(tx: &mut Transaction<'static, Postgres>, loan: NewLoan) -> AppResult<Loan> {
        let book = Self::lock_book(tx, loan.book_id).await?;
        book.ensure_lendable()?;

        // Share lock: a concurrent member deletion waits for this checkout
        let member: Option<i32> = sqlx::query_scalar("SELECT id FROM members WHERE id = $1 FOR SHARE")
            .bind(loan.member_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify_db_error)?;
        if member.is_none() {
            return Err(LoanError::MemberNotFound(loan.member_id).into());
        }

        let already_borrowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1 AND member_id = $2 AND NOT is_returned)",
        )
        .bind(loan.book_id)
        .bind(loan.member_id)
        .fetch_one(&mut **tx)
        .await?;
        if already_borrowed {
            return Err(LoanError::DuplicateActiveLoan.into());
        }

        let decremented = sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1 WHERE id = $1 AND available_copies > 0",
        )
        .bind(loan.book_id)
        .execute(&mut **tx)
        .await?;
        if decremented.rows_affected() != 1 {
            return Err(LoanError::NoAvailableCopies.into());
        }

        sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (book_id, member_id, loan_date, due_date, is_returned)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING *
            "#,
        )
        .bind(loan.book_id)
        .bind(loan.member_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.constraint() == Some(ONE_ACTIVE_PER_PAIR) => {
                LoanError::DuplicateActiveLoan.into()
            }
            other => classify_db_error(other),
        })
    }

    async fn return_in(
        tx: &mut Transaction<'static, Postgres>,
        book_id: i32,
        member_id: i32,
        return_date: NaiveDate,
    ) -> AppResult<Loan> {
        let book = Self::lock_book(tx, book_id).await?;

        // Most recent active loan for the pair; there should be at most one
        let loan_id: i32 = sqlx::query_scalar(
            r#"
            SELECT id FROM loans
            WHERE book_id = $1 AND member_id = $2 AND NOT is_returned
            ORDER BY loan_date DESC, id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .bind(member_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify_db_error)?
        .ok_or(LoanError::NoActiveLoan)?;

        let returned = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET is_returned = TRUE, return_date = $2 WHERE id = $1 RETURNING *",
        )
        .bind(loan_id)
        .bind(return_date)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query("UPDATE books SET available_copies = $2 WHERE id = $1")
            .bind(book_id)
            .bind(book.copies_after_return())
            .execute(&mut **tx)
            .await?;

        Ok(returned)
    }

    async fn extend_in(
        tx: &mut Transaction<'static, Postgres>,
        loan_id: i32,
        raw_days: &Value,
        today: NaiveDate,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify_db_error)?
            .ok_or(LoanError::LoanNotFound(loan_id))?;

        let new_due_date = loan.extension(raw_days, today)?;

        let extended = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET due_date = $2 WHERE id = $1 RETURNING *",
        )
        .bind(loan_id)
        .bind(new_due_date)
        .fetch_one(&mut **tx)
        .await?;

        Ok(extended)
    }
}

#[async_trait]
impl LoanStore for LoansRepository {
    async fn checkout(&self, loan: NewLoan) -> AppResult<Loan> {
        let mut tx = self.begin_locking().await?;
        let created = Self::checkout_in(&mut tx, loan).await?;
        tx.commit().await.map_err(classify_db_error)?;
        Ok(created)
    }

    async fn return_loan(&self, book_id: i32, member_id: i32, return_date: NaiveDate) -> AppResult<Loan> {
        let mut tx = self.begin_locking().await?;
        let returned = Self::return_in(&mut tx, book_id, member_id, return_date).await?;
        tx.commit().await.map_err(classify_db_error)?;
        Ok(returned)
    }

    async fn extend_due_date(&self, loan_id: i32, raw_days: &Value, today: NaiveDate) -> AppResult<Loan> {
        let mut tx = self.begin_locking().await?;
        let extended = Self::extend_in(&mut tx, loan_id, raw_days, today).await?;
        tx.commit().await.map_err(classify_db_error)?;
        Ok(extended)
    }

    async fn find_overdue(&self, today: NaiveDate) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE NOT is_returned AND due_date < $1 ORDER BY due_date, id",
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn top_active_members(&self, limit: i64) -> AppResult<Vec<MemberActivity>> {
        let members = sqlx::query_as::<_, MemberActivity>(
            r#"
            SELECT m.id, m.username, m.email, COUNT(l.id) AS active_loans
            FROM members m
            JOIN loans l ON l.member_id = m.id AND NOT l.is_returned
            GROUP BY m.id, m.username, m.email
            ORDER BY active_loans DESC, m.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn loan_notice(&self, loan_id: i32) -> AppResult<Option<LoanNotice>> {
        let notice = sqlx::query_as::<_, LoanNotice>(
            r#"
            SELECT l.id AS loan_id, m.username, m.email, b.title AS book_title,
                   l.loan_date, l.due_date, l.is_returned, l.return_date
            FROM loans l
            JOIN members m ON m.id = l.member_id
            JOIN books b ON b.id = l.book_id
            WHERE l.id = $1
            "#,
        )
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notice)
    }
}

